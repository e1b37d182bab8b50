//! Application-level error type.
//! Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
//! Internal details are logged, never leaked to consumers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow already running")]
    AlreadyRunning,

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::AlreadyRunning => AppError::AlreadyRunning,
            EngineError::InvalidInput(msg) => AppError::Validation(msg),
            EngineError::NotFound(msg) => AppError::NotFound(msg),
            EngineError::Tracker(e) => AppError::Tracker(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "input_invalid", msg.clone()),
            AppError::AlreadyRunning => (
                StatusCode::CONFLICT,
                "already_running",
                "A workflow is already running for this user".to_string(),
            ),
            AppError::Tracker(e) => {
                tracing::error!("Tracker error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "tracker_error",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
