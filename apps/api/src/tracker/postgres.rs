//! Postgres tracker — durable application records via sqlx.
//!
//! Single table keyed by (user_id, job_id) with an index matching the list
//! endpoint's ordering. Retry accumulation happens in the upsert statement
//! so concurrent readers never observe a half-merged row.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::{TrackerError, TrackerStore};
use crate::models::application::{ApplicationRecord, ApplicationStatus};

pub struct PgTracker {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    user_id: String,
    job_id: String,
    job_title: String,
    company: String,
    status: String,
    submitted_at: Option<DateTime<Utc>>,
    confirmation_id: Option<String>,
    error: Option<String>,
    retry_count: i32,
    match_score: Option<f32>,
    match_reasoning: Option<String>,
    cover_letter: Option<String>,
}

impl From<ApplicationRow> for ApplicationRecord {
    fn from(row: ApplicationRow) -> Self {
        ApplicationRecord {
            user_id: row.user_id,
            job_id: row.job_id,
            job_title: row.job_title,
            company: row.company,
            status: ApplicationStatus::parse(&row.status).unwrap_or(ApplicationStatus::Failed),
            submitted_at: row.submitted_at,
            confirmation_id: row.confirmation_id,
            error: row.error,
            retry_count: row.retry_count.max(0) as u32,
            match_score: row.match_score,
            match_reasoning: row.match_reasoning,
            cover_letter: row.cover_letter,
        }
    }
}

impl PgTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the applications table and list index if absent.
    pub async fn ensure_schema(&self) -> Result<(), TrackerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                user_id         TEXT NOT NULL,
                job_id          TEXT NOT NULL,
                job_title       TEXT NOT NULL DEFAULT '',
                company         TEXT NOT NULL DEFAULT '',
                status          TEXT NOT NULL,
                submitted_at    TIMESTAMPTZ,
                confirmation_id TEXT,
                error           TEXT,
                retry_count     INTEGER NOT NULL DEFAULT 0,
                match_score     REAL,
                match_reasoning TEXT,
                cover_letter    TEXT,
                updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, job_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS applications_user_submitted_idx
                ON applications (user_id, submitted_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("tracker schema ready");
        Ok(())
    }
}

#[async_trait]
impl TrackerStore for PgTracker {
    async fn upsert_attempt(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, TrackerError> {
        let row: ApplicationRow = sqlx::query_as(
            r#"
            INSERT INTO applications
                (user_id, job_id, job_title, company, status, submitted_at,
                 confirmation_id, error, retry_count, match_score,
                 match_reasoning, cover_letter, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (user_id, job_id) DO UPDATE SET
                job_title       = EXCLUDED.job_title,
                company         = EXCLUDED.company,
                status          = EXCLUDED.status,
                submitted_at    = EXCLUDED.submitted_at,
                confirmation_id = EXCLUDED.confirmation_id,
                error           = EXCLUDED.error,
                retry_count     = CASE
                    WHEN applications.status IN ('failed', 'retried')
                        THEN applications.retry_count + EXCLUDED.retry_count
                    ELSE EXCLUDED.retry_count
                END,
                match_score     = EXCLUDED.match_score,
                match_reasoning = EXCLUDED.match_reasoning,
                cover_letter    = EXCLUDED.cover_letter,
                updated_at      = NOW()
            RETURNING user_id, job_id, job_title, company, status, submitted_at,
                      confirmation_id, error, retry_count, match_score,
                      match_reasoning, cover_letter
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.job_id)
        .bind(&record.job_title)
        .bind(&record.company)
        .bind(record.status.as_str())
        .bind(record.submitted_at)
        .bind(&record.confirmation_id)
        .bind(&record.error)
        .bind(record.retry_count as i32)
        .bind(record.match_score)
        .bind(&record.match_reasoning)
        .bind(&record.cover_letter)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(
        &self,
        user_id: &str,
        job_id: &str,
    ) -> Result<Option<ApplicationRecord>, TrackerError> {
        let row: Option<ApplicationRow> = sqlx::query_as(
            r#"
            SELECT user_id, job_id, job_title, company, status, submitted_at,
                   confirmation_id, error, retry_count, match_score,
                   match_reasoning, cover_letter
            FROM applications
            WHERE user_id = $1 AND job_id = $2
            "#,
        )
        .bind(user_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        user_id: &str,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, TrackerError> {
        let rows: Vec<ApplicationRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT user_id, job_id, job_title, company, status, submitted_at,
                           confirmation_id, error, retry_count, match_score,
                           match_reasoning, cover_letter
                    FROM applications
                    WHERE user_id = $1 AND status = $2
                    ORDER BY submitted_at DESC NULLS LAST, job_id
                    "#,
                )
                .bind(user_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT user_id, job_id, job_title, company, status, submitted_at,
                           confirmation_id, error, retry_count, match_score,
                           match_reasoning, cover_letter
                    FROM applications
                    WHERE user_id = $1
                    ORDER BY submitted_at DESC NULLS LAST, job_id
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_submitted_today(&self, user_id: &str) -> Result<u32, TrackerError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM applications
            WHERE user_id = $1
              AND status = 'submitted'
              AND submitted_at > NOW() - INTERVAL '24 hours'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    async fn applied_job_ids(&self, user_id: &str) -> Result<HashSet<String>, TrackerError> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT job_id FROM applications WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn clear(&self, user_id: &str) -> Result<(), TrackerError> {
        sqlx::query("DELETE FROM applications WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
