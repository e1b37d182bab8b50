use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::engine::EngineConfig;
use crate::portal::retry::RetryConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Optional: when unset, the in-memory tracker is used.
    pub database_url: Option<String>,
    pub portal_api_url: String,
    pub anthropic_api_key: String,
    pub embeddings_api_key: String,
    pub max_parallel_jobs_per_run: u32,
    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub event_replay_window: usize,
    pub kill_poll_interval_ms: u64,
    pub post_terminal_grace_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            portal_api_url: require_env("PORTAL_API_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            embeddings_api_key: require_env("EMBEDDINGS_API_KEY")?,
            max_parallel_jobs_per_run: env_or("MAX_PARALLEL_JOBS_PER_RUN", 1)?,
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_ms: env_or("RETRY_BASE_MS", 1000)?,
            retry_cap_ms: env_or("RETRY_CAP_MS", 30_000)?,
            event_replay_window: env_or("EVENT_REPLAY_WINDOW", 256)?,
            kill_poll_interval_ms: env_or("KILL_POLL_INTERVAL_MS", 2000)?,
            post_terminal_grace_ms: env_or("POST_TERMINAL_GRACE_MS", 5000)?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_parallel_jobs_per_run: self.max_parallel_jobs_per_run,
            retry: RetryConfig {
                max_attempts: self.retry_max_attempts,
                base: Duration::from_millis(self.retry_base_ms),
                cap: Duration::from_millis(self.retry_cap_ms),
                kill_poll_interval: Duration::from_millis(self.kill_poll_interval_ms),
            },
            job_fetch_limit: 100,
            post_terminal_grace: Duration::from_millis(self.post_terminal_grace_ms),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Environment variable '{key}' is invalid: {e}")),
        Err(_) => Ok(default),
    }
}
