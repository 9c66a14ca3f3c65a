use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

use duet_shared::errors::AppResult;
use duet_shared::types::ApiResponse;

use crate::models::Profile;
use crate::AppState;

// --- GET /recommendations/:viewer_id ---

pub async fn get_recommendation(
    State(state): State<Arc<AppState>>,
    Path(viewer_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = state.recommendations.get_recommendation(viewer_id).await?;
    Ok(Json(ApiResponse::ok(profile)))
}
