//! Axum route handlers for the workflow API.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::engine::run::RunSnapshot;
use crate::errors::AppError;
use crate::models::policy::ApplyPolicy;
use crate::models::profile::Profile;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartWorkflowRequest {
    pub user_id: String,
    pub profile: Profile,
    #[serde(default)]
    pub policy: ApplyPolicy,
}

/// POST /workflow/start
///
/// Accepts the run and returns immediately; progress streams via SSE.
/// 409 when a run is already active for the user.
pub async fn handle_start(
    State(state): State<AppState>,
    Json(request): Json<StartWorkflowRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".to_string()));
    }

    state
        .engine
        .start(request.user_id.clone(), request.profile, request.policy)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "user_id": request.user_id })),
    ))
}

/// POST /workflow/kill/:user_id
///
/// Level-triggered: sets the kill flag and returns without blocking.
pub async fn handle_kill(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.engine.stop(&user_id)?;
    Ok(Json(json!({ "stopped": true })))
}

/// GET /workflow/status/:user_id
pub async fn handle_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<RunSnapshot>, AppError> {
    state
        .engine
        .status(&user_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no workflow found for user {user_id}")))
}

/// GET /workflow/stream/:user_id
///
/// SSE stream: replay of the run so far, then live events until terminal.
/// Each message's data is one JSON event object.
pub async fn handle_stream(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Sse<ReceiverStream<Result<SseEvent, Infallible>>>, AppError> {
    let mut subscription = state
        .engine
        .subscribe(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("no workflow events for user {user_id}")))?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<SseEvent, Infallible>>(32);
    tokio::spawn(async move {
        while let Some(record) = subscription.next().await {
            let data = serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string());
            if tx.send(Ok(SseEvent::default().data(data))).await.is_err() {
                break;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
