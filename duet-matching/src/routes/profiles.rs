use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use duet_shared::errors::{AppError, AppResult, ErrorCode};
use duet_shared::types::ApiResponse;

use crate::models::{deserialize_photo, Gender, Profile, ProfileInput};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 100, message = "full_name must be 1-100 characters"))]
    pub full_name: String,
    pub gender: Gender,
    #[validate(range(min = 18, max = 120, message = "age must be between 18 and 120"))]
    pub age: i32,
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    /// Base64-encoded image bytes.
    #[serde(default, deserialize_with = "deserialize_photo")]
    pub photo: Option<Vec<u8>>,
}

// --- PUT /profiles/:user_id ---

pub async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<ProfileRequest>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    req.validate().map_err(super::validation_error)?;

    let profile = state
        .store
        .upsert_profile(ProfileInput {
            user_id,
            full_name: req.full_name,
            gender: req.gender,
            age: req.age,
            description: req.description,
            photo: req.photo,
        })
        .await?;

    tracing::info!(user_id, primary_rating = profile.primary_rating, "profile saved");
    Ok(Json(ApiResponse::ok(profile)))
}

// --- GET /profiles/:user_id ---

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = state
        .store
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

    Ok(Json(ApiResponse::ok(profile)))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn saving_rates_completeness_and_keeps_behavioral_score() {
        let app = TestApp::new();
        let (status, body) = app
            .put("/profiles/5", json!({ "full_name": "Mia", "gender": "female", "age": 26 }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["primary_rating"], 30);
        assert_eq!(body["data"]["behavioral_rating"], 0);

        app.like(9, 5).await;

        let (_, body) = app
            .put(
                "/profiles/5",
                json!({
                    "full_name": "Mia",
                    "gender": "female",
                    "age": 26,
                    "description": "runner",
                    "photo": "AQID"
                }),
            )
            .await;
        assert_eq!(body["data"]["primary_rating"], 100);
        assert_eq!(body["data"]["behavioral_rating"], 1);
        assert_eq!(body["data"]["result_rating"], 50);
        assert_eq!(body["data"]["photo"], "AQID");
    }

    #[tokio::test]
    async fn underage_profile_is_rejected() {
        let app = TestApp::new();

        let (status, body) = app
            .put("/profiles/5", json!({ "full_name": "Kid", "gender": "male", "age": 15 }))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "E0002");
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let app = TestApp::new();

        let (status, body) = app.get("/profiles/404").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E2001");
    }
}
