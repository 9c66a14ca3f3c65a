use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use duet_shared::errors::{AppError, AppResult, ErrorCode};
use duet_shared::types::ApiResponse;

use crate::models::{Filter, Gender};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct FilterRequest {
    pub gender: Gender,
    #[validate(range(min = 18, max = 120, message = "min_age must be between 18 and 120"))]
    pub min_age: i32,
    #[validate(range(min = 18, max = 120, message = "max_age must be between 18 and 120"))]
    pub max_age: i32,
}

// --- PUT /filters/:user_id ---

pub async fn upsert_filter(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<FilterRequest>,
) -> AppResult<Json<ApiResponse<Filter>>> {
    req.validate().map_err(super::validation_error)?;

    if req.min_age > req.max_age {
        return Err(AppError::new(
            ErrorCode::InvalidFilter,
            "min_age must not exceed max_age",
        ));
    }

    let filter = state
        .store
        .upsert_filter(Filter {
            user_id,
            gender: req.gender,
            min_age: req.min_age,
            max_age: req.max_age,
        })
        .await?;

    Ok(Json(ApiResponse::ok(filter)))
}

// --- GET /filters/:user_id ---

pub async fn get_filter(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Filter>>> {
    let filter = state
        .store
        .get_filter(user_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::FilterNotFound, "filter required"))?;

    Ok(Json(ApiResponse::ok(filter)))
}
