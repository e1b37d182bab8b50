mod config;
mod db;
mod engine;
mod errors;
mod events;
mod llm;
mod matching;
mod models;
mod personalize;
mod portal;
mod routes;
mod state;
mod tracker;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::engine::WorkflowEngine;
use crate::events::bus::EventBus;
use crate::llm::LlmClient;
use crate::matching::embeddings::{EmbeddingProvider, GeminiEmbeddingClient};
use crate::matching::ranker::Ranker;
use crate::personalize::{LlmPersonalizer, Personalizer};
use crate::portal::{HttpPortalClient, Portal};
use crate::routes::build_router;
use crate::state::AppState;
use crate::tracker::memory::MemoryTracker;
use crate::tracker::postgres::PgTracker;
use crate::tracker::TrackerStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Emissary API v{}", env!("CARGO_PKG_VERSION"));

    // Tracker: Postgres when configured, in-memory otherwise
    let tracker: Arc<dyn TrackerStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            let tracker = PgTracker::new(pool);
            tracker.ensure_schema().await?;
            Arc::new(tracker)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory tracker");
            Arc::new(MemoryTracker::new())
        }
    };

    // External collaborators
    let portal: Arc<dyn Portal> = Arc::new(HttpPortalClient::new(config.portal_api_url.clone()));
    info!("Portal client initialized ({})", config.portal_api_url);

    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm::MODEL);
    let personalizer: Arc<dyn Personalizer> = Arc::new(LlmPersonalizer::new(llm));

    let embeddings: Arc<dyn EmbeddingProvider> =
        Arc::new(GeminiEmbeddingClient::new(config.embeddings_api_key.clone()));
    let ranker = Ranker::new(embeddings);

    // Engine wiring
    let events = Arc::new(EventBus::new(config.event_replay_window));
    let engine = Arc::new(WorkflowEngine::new(
        config.engine_config(),
        portal,
        personalizer,
        tracker.clone(),
        ranker,
        events,
    ));

    // Build app state
    let state = AppState { engine, tracker };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
