use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use duet_shared::errors::{AppError, AppResult, ErrorCode};
use duet_shared::types::event::payloads::{ActionKind, ActionSubmitted};
use duet_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub action: ActionKind,
}

// --- POST /actions ---

/// Queues the action on the bus. It is applied once the ingestor consumes it.
pub async fn submit_action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ActionSubmitted>>)> {
    if req.from_user_id == req.to_user_id {
        return Err(AppError::new(
            ErrorCode::InvalidAction,
            "users cannot act on themselves",
        ));
    }

    let action = ActionSubmitted {
        from_user_id: req.from_user_id,
        to_user_id: req.to_user_id,
        action: req.action,
    };
    state.publisher.publish_action(&action).await?;

    tracing::debug!(
        from_user_id = action.from_user_id,
        to_user_id = action.to_user_id,
        action = %action.action,
        "action submitted"
    );

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(action))))
}
