//! Axum route handlers for the application tracker API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::summarize;
use crate::errors::AppError;
use crate::models::application::ApplicationStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// GET /tracker/applications/:user_id?status=…
///
/// All application records for the user with a summary block.
pub async fn handle_list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(ApplicationStatus::parse(raw).ok_or_else(|| {
            AppError::Validation(format!(
                "unknown status filter '{raw}' (expected queued, submitted, failed, skipped, or retried)"
            ))
        })?),
        None => None,
    };

    let applications = state.tracker.list(&user_id, status).await?;
    let summary = summarize(&applications);

    Ok(Json(json!({
        "user_id": user_id,
        "summary": summary,
        "applications": applications,
    })))
}

/// POST /tracker/applications/:user_id/:job_id/retry
///
/// Enqueues a single-job mini-run for a failed application.
pub async fn handle_retry(
    State(state): State<AppState>,
    Path((user_id, job_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.engine.retry_job(&user_id, &job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}

/// DELETE /tracker/applications/:user_id
pub async fn handle_clear(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.tracker.clear(&user_id).await?;
    Ok(Json(json!({ "cleared": true })))
}
