pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::engine::handlers as workflow;
use crate::state::AppState;
use crate::tracker::handlers as tracker;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // ── Workflow API ──────────────────────────────────────────────────
        .route("/workflow/start", post(workflow::handle_start))
        .route("/workflow/kill/:user_id", post(workflow::handle_kill))
        .route("/workflow/status/:user_id", get(workflow::handle_status))
        .route("/workflow/stream/:user_id", get(workflow::handle_stream))
        // ── Tracker API ───────────────────────────────────────────────────
        .route(
            "/tracker/applications/:user_id",
            get(tracker::handle_list).delete(tracker::handle_clear),
        )
        .route(
            "/tracker/applications/:user_id/:job_id/retry",
            post(tracker::handle_retry),
        )
        .with_state(state)
}
