//! Progress events published by the workflow engine.
//!
//! Events are the source of truth for run progress; the SSE endpoint is a
//! consumer of the bus, not a producer. Every event carries a per-run
//! sequence number and timestamp assigned by the bus at publish time.

pub mod bus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::run::RunStatus;
use crate::models::application::ApplicationRecord;
use crate::models::job::JobPosting;

/// Compact job view carried in progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_reasoning: Option<String>,
}

impl JobSummary {
    pub fn from_posting(
        job: &JobPosting,
        match_score: Option<f32>,
        match_reasoning: Option<String>,
    ) -> Self {
        Self {
            id: job.id.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            remote: job.is_remote(),
            match_score,
            match_reasoning,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        message: String,
    },
    StageUpdate {
        stage: String,
        stage_message: String,
        current_index: usize,
        total_jobs: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
    },
    JobsFetched {
        total_jobs: usize,
    },
    JobProcessing {
        job: JobSummary,
        current_index: usize,
        total_jobs: usize,
    },
    ApplicationResult {
        application: ApplicationRecord,
        current_index: usize,
        total_jobs: usize,
        total_submitted: u32,
        total_failed: u32,
    },
    JobSkipped {
        job_id: String,
        job_title: String,
        reason: String,
        current_index: usize,
        total_jobs: usize,
    },
    WorkflowCompleted {
        status: RunStatus,
        total_submitted: u32,
        total_failed: u32,
        total_skipped: u32,
        message: String,
    },
    WorkflowFailed {
        error: String,
    },
}

impl WorkflowEvent {
    /// Terminal events end the SSE stream (after the post-terminal grace).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::WorkflowCompleted { .. } | WorkflowEvent::WorkflowFailed { .. }
        )
    }
}

/// An event as delivered to subscribers: the payload plus the per-run
/// sequence number and publish timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let record = EventRecord {
            seq: 3,
            ts: Utc::now(),
            event: WorkflowEvent::JobsFetched { total_jobs: 2 },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "jobs_fetched");
        assert_eq!(value["seq"], 3);
        assert_eq!(value["total_jobs"], 2);
    }

    #[test]
    fn test_terminal_detection() {
        assert!(WorkflowEvent::WorkflowFailed {
            error: "boom".to_string()
        }
        .is_terminal());
        assert!(!WorkflowEvent::JobsFetched { total_jobs: 0 }.is_terminal());
    }

    #[test]
    fn test_stage_update_omits_absent_attempt() {
        let value = serde_json::to_value(WorkflowEvent::StageUpdate {
            stage: "submitting".to_string(),
            stage_message: "Submitting application".to_string(),
            current_index: 1,
            total_jobs: 4,
            attempt: None,
        })
        .unwrap();
        assert!(value.get("attempt").is_none());
    }
}
