//! Application tracker — persists and queries application records.
//!
//! One record per (user, job); retries mutate in place. The engine is the
//! only writer for a given run, so writes are already serialized; reads may
//! come concurrently from HTTP callers.

pub mod handlers;
pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::application::{ApplicationRecord, ApplicationStatus};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Inserts or updates the record for `(user_id, job_id)`. When the prior
    /// record for the pair is a failure, its retry count carries over into
    /// the new record.
    async fn upsert_attempt(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, TrackerError>;

    async fn get(
        &self,
        user_id: &str,
        job_id: &str,
    ) -> Result<Option<ApplicationRecord>, TrackerError>;

    /// Records for a user, newest submissions first, never-submitted last.
    async fn list(
        &self,
        user_id: &str,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, TrackerError>;

    /// Submissions in the rolling 24 h window, for the daily cap.
    async fn count_submitted_today(&self, user_id: &str) -> Result<u32, TrackerError>;

    /// Every job id the user has a record for; the engine's de-dup set.
    async fn applied_job_ids(&self, user_id: &str) -> Result<HashSet<String>, TrackerError>;

    async fn clear(&self, user_id: &str) -> Result<(), TrackerError>;
}

/// Roll-up block returned alongside the application list.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSummary {
    pub total: usize,
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success_rate: f64,
}

pub fn summarize(records: &[ApplicationRecord]) -> TrackerSummary {
    let total = records.len();
    let submitted = records
        .iter()
        .filter(|r| r.status == ApplicationStatus::Submitted)
        .count();
    let failed = records
        .iter()
        .filter(|r| r.status == ApplicationStatus::Failed)
        .count();
    let skipped = records
        .iter()
        .filter(|r| r.status == ApplicationStatus::Skipped)
        .count();
    let success_rate = if total > 0 {
        (submitted as f64 / total as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };
    TrackerSummary {
        total,
        submitted,
        failed,
        skipped,
        success_rate,
    }
}

/// Merge rule shared by the store implementations: a record replacing a
/// failed one accumulates the prior retry count.
pub(crate) fn merge_attempt(
    prior: Option<&ApplicationRecord>,
    mut record: ApplicationRecord,
) -> ApplicationRecord {
    if let Some(prior) = prior {
        if matches!(
            prior.status,
            ApplicationStatus::Failed | ApplicationStatus::Retried
        ) {
            record.retry_count += prior.retry_count;
        }
    }
    record
}
