//! In-memory tracker — the default store when no database is configured.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{merge_attempt, TrackerError, TrackerStore};
use crate::models::application::{ApplicationRecord, ApplicationStatus};

#[derive(Default)]
pub struct MemoryTracker {
    // user_id → job_id → record
    records: Mutex<HashMap<String, HashMap<String, ApplicationRecord>>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerStore for MemoryTracker {
    async fn upsert_attempt(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, TrackerError> {
        let mut store = self.records.lock().expect("tracker lock poisoned");
        let user_records = store.entry(record.user_id.clone()).or_default();
        let merged = merge_attempt(user_records.get(&record.job_id), record);
        user_records.insert(merged.job_id.clone(), merged.clone());
        Ok(merged)
    }

    async fn get(
        &self,
        user_id: &str,
        job_id: &str,
    ) -> Result<Option<ApplicationRecord>, TrackerError> {
        let store = self.records.lock().expect("tracker lock poisoned");
        Ok(store
            .get(user_id)
            .and_then(|records| records.get(job_id))
            .cloned())
    }

    async fn list(
        &self,
        user_id: &str,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, TrackerError> {
        let store = self.records.lock().expect("tracker lock poisoned");
        let mut records: Vec<ApplicationRecord> = store
            .get(user_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();

        if let Some(status) = status {
            records.retain(|r| r.status == status);
        }

        // Newest submissions first; records never submitted sort last.
        records.sort_by(|a, b| match (a.submitted_at, b.submitted_at) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.job_id.cmp(&b.job_id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.job_id.cmp(&b.job_id),
        });
        Ok(records)
    }

    async fn count_submitted_today(&self, user_id: &str) -> Result<u32, TrackerError> {
        let cutoff = Utc::now() - Duration::hours(24);
        let store = self.records.lock().expect("tracker lock poisoned");
        let count = store
            .get(user_id)
            .map(|records| {
                records
                    .values()
                    .filter(|r| r.status == ApplicationStatus::Submitted)
                    .filter(|r| r.submitted_at.is_some_and(|t| t > cutoff))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u32)
    }

    async fn applied_job_ids(&self, user_id: &str) -> Result<HashSet<String>, TrackerError> {
        let store = self.records.lock().expect("tracker lock poisoned");
        Ok(store
            .get(user_id)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: &str) -> Result<(), TrackerError> {
        let mut store = self.records.lock().expect("tracker lock poisoned");
        store.remove(user_id);
        Ok(())
    }
}
