//! Run state — the registry entry for one user's workflow.
//!
//! The kill switch is a plain flag on the run, not a signal: `stop` sets it
//! and returns; the run task observes it at stage boundaries and inside
//! sleeps. Progress lives behind a single lock so status snapshots are
//! always internally consistent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::policy::ApplyPolicy;
use crate::models::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

/// Mutable run progress, updated by the run task only.
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub status: RunStatus,
    pub cursor: usize,
    pub total: usize,
    pub submitted_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub errors: Vec<String>,
}

/// One user's run: immutable inputs, the kill flag, and guarded progress.
/// Retained after terminal state so the single-job retry endpoint can reuse
/// the profile/policy snapshot.
pub struct RunState {
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub profile: Arc<Profile>,
    pub policy: ApplyPolicy,
    kill: AtomicBool,
    progress: Mutex<RunProgress>,
}

impl RunState {
    pub fn new(user_id: String, profile: Arc<Profile>, policy: ApplyPolicy) -> Self {
        Self {
            user_id,
            started_at: Utc::now(),
            profile,
            policy,
            kill: AtomicBool::new(false),
            progress: Mutex::new(RunProgress {
                status: RunStatus::Running,
                cursor: 0,
                total: 0,
                submitted_count: 0,
                failed_count: 0,
                skipped_count: 0,
                errors: Vec::new(),
            }),
        }
    }

    pub fn request_kill(&self) {
        self.kill.store(true, Ordering::Relaxed);
    }

    pub fn kill_requested(&self) -> bool {
        self.kill.load(Ordering::Relaxed)
    }

    pub fn kill_flag(&self) -> &AtomicBool {
        &self.kill
    }

    pub fn status(&self) -> RunStatus {
        self.progress.lock().expect("run lock poisoned").status
    }

    pub fn update<F: FnOnce(&mut RunProgress)>(&self, f: F) {
        let mut progress = self.progress.lock().expect("run lock poisoned");
        f(&mut progress);
    }

    /// Transitions to a terminal status. A run that already reached a
    /// terminal status keeps it.
    pub fn finalize(&self, status: RunStatus) {
        let mut progress = self.progress.lock().expect("run lock poisoned");
        if progress.status == RunStatus::Running {
            progress.status = status;
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let progress = self.progress.lock().expect("run lock poisoned");
        RunSnapshot {
            user_id: self.user_id.clone(),
            status: progress.status,
            started_at: self.started_at,
            current_job_index: progress.cursor,
            total_jobs: progress.total,
            submitted_count: progress.submitted_count,
            failed_count: progress.failed_count,
            skipped_count: progress.skipped_count,
            kill_requested: self.kill_requested(),
            errors: progress.errors.clone(),
        }
    }
}

/// Cheap, serializable view returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub user_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub current_job_index: usize,
    pub total_jobs: usize,
    pub submitted_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub kill_requested: bool,
    pub errors: Vec<String>,
}
