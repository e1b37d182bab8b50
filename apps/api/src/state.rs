use std::sync::Arc;

use crate::engine::WorkflowEngine;
use crate::tracker::TrackerStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub tracker: Arc<dyn TrackerStore>,
}
