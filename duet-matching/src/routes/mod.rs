pub mod actions;
pub mod filters;
pub mod health;
pub mod matches;
pub mod profiles;
pub mod recommendations;

use duet_shared::errors::{AppError, ErrorCode};

/// Field-level validator output goes into the error details.
fn validation_error(errors: validator::ValidationErrors) -> AppError {
    let details = serde_json::to_value(&errors).unwrap_or_default();
    AppError::with_details(ErrorCode::ValidationError, "invalid request body", details)
}
