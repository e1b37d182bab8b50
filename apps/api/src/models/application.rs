//! Application records — one row per (user, job), mutated by retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Queued,
    Submitted,
    Failed,
    Skipped,
    Retried,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Queued => "queued",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::Skipped => "skipped",
            ApplicationStatus::Retried => "retried",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ApplicationStatus::Queued),
            "submitted" => Some(ApplicationStatus::Submitted),
            "failed" => Some(ApplicationStatus::Failed),
            "skipped" => Some(ApplicationStatus::Skipped),
            "retried" => Some(ApplicationStatus::Retried),
            _ => None,
        }
    }
}

/// The tracker row for a single (user, job) pair. Uniqueness is enforced by
/// the store; retries mutate the row in place rather than appending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub user_id: String,
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmation_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub match_score: Option<f32>,
    #[serde(default)]
    pub match_reasoning: Option<String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

impl ApplicationRecord {
    /// A fresh record for a job entering the pipeline.
    pub fn queued(user_id: &str, job_id: &str, job_title: &str, company: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            job_id: job_id.to_string(),
            job_title: job_title.to_string(),
            company: company.to_string(),
            status: ApplicationStatus::Queued,
            submitted_at: None,
            confirmation_id: None,
            error: None,
            retry_count: 0,
            match_score: None,
            match_reasoning: None,
            cover_letter: None,
        }
    }
}
