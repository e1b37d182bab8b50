//! Workflow engine — owns one run per user and drives the stage machine.
//!
//! Per-job flow:
//! queued → policy_pre → personalizing → grounding → policy_post →
//! submitting → (submitted | failed) → tracker write → next, with a skip
//! path at each gate. The kill switch is checked at every stage boundary;
//! blocking sleeps poll it on a bounded cadence inside the retry executor.
//!
//! Per-job errors never terminate the run. Only cancellation, the daily
//! cap, queue exhaustion, or a top-level failure (portal listing, tracker
//! unavailable for the cap check) end it.

pub mod gate;
pub mod handlers;
pub mod run;


use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::bus::{EventBus, Subscription};
use crate::events::{JobSummary, WorkflowEvent};
use crate::matching::ranker::{JobMatch, Ranker};
use crate::models::application::{ApplicationRecord, ApplicationStatus};
use crate::models::job::JobPosting;
use crate::models::policy::ApplyPolicy;
use crate::models::profile::Profile;
use crate::personalize::grounding::ground_claims;
use crate::personalize::Personalizer;
use crate::portal::retry::{RetryConfig, RetryExecutor, SubmitResolution};
use crate::portal::{Portal, SubmitRequest};
use crate::tracker::{TrackerError, TrackerStore};
use gate::{post_ground_gate, pre_personalize_gate, GateDecision, SkipReason, StopReason};
use run::{RunSnapshot, RunState, RunStatus};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recognized but clamped to 1: sequential processing is what keeps
    /// submissions in strict rank order and events monotonic.
    pub max_parallel_jobs_per_run: u32,
    pub retry: RetryConfig,
    pub job_fetch_limit: usize,
    pub post_terminal_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs_per_run: 1,
            retry: RetryConfig::default(),
            job_fetch_limit: 100,
            post_terminal_grace: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a workflow is already running for this user")]
    AlreadyRunning,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// How a run ended, short of a top-level failure.
enum Termination {
    Completed { message: String },
    Stopped,
}

pub struct WorkflowEngine {
    config: EngineConfig,
    portal: Arc<dyn Portal>,
    personalizer: Arc<dyn Personalizer>,
    tracker: Arc<dyn TrackerStore>,
    ranker: Ranker,
    events: Arc<EventBus>,
    retry: RetryExecutor,
    runs: Mutex<HashMap<String, Arc<RunState>>>,
}

impl WorkflowEngine {
    pub fn new(
        config: EngineConfig,
        portal: Arc<dyn Portal>,
        personalizer: Arc<dyn Personalizer>,
        tracker: Arc<dyn TrackerStore>,
        ranker: Ranker,
        events: Arc<EventBus>,
    ) -> Self {
        if config.max_parallel_jobs_per_run > 1 {
            warn!(
                requested = config.max_parallel_jobs_per_run,
                "max_parallel_jobs_per_run > 1 is not supported yet, clamping to 1"
            );
        }
        let retry = RetryExecutor::new(config.retry.clone());
        Self {
            config,
            portal,
            personalizer,
            tracker,
            ranker,
            events,
            retry,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Registers and launches a run. Returns immediately; progress flows
    /// through the event bus. At most one running run per user.
    pub fn start(
        self: &Arc<Self>,
        user_id: String,
        profile: Profile,
        policy: ApplyPolicy,
    ) -> Result<(), EngineError> {
        profile.validate().map_err(EngineError::InvalidInput)?;
        policy.validate().map_err(EngineError::InvalidInput)?;

        let run = {
            let mut runs = self.runs.lock().expect("run registry lock poisoned");
            if let Some(existing) = runs.get(&user_id) {
                if existing.status() == RunStatus::Running {
                    return Err(EngineError::AlreadyRunning);
                }
            }
            let run = Arc::new(RunState::new(user_id.clone(), Arc::new(profile), policy));
            runs.insert(user_id.clone(), run.clone());
            run
        };

        info!(%user_id, "workflow started");
        self.events.reset(&user_id);
        self.events.publish(
            &user_id,
            WorkflowEvent::WorkflowStarted {
                message: "Workflow started".to_string(),
            },
        );

        let engine = self.clone();
        tokio::spawn(async move { engine.drive(run, None).await });
        Ok(())
    }

    /// Level-triggered kill: sets the flag and returns. The run observes it
    /// at the next stage boundary or sleep poll.
    pub fn stop(&self, user_id: &str) -> Result<(), EngineError> {
        let runs = self.runs.lock().expect("run registry lock poisoned");
        match runs.get(user_id) {
            Some(run) if run.status() == RunStatus::Running => {
                run.request_kill();
                info!(user_id, "kill switch activated");
                Ok(())
            }
            _ => Err(EngineError::NotFound(format!(
                "no running workflow for user {user_id}"
            ))),
        }
    }

    /// Cheap, non-blocking snapshot of the user's most recent run.
    pub fn status(&self, user_id: &str) -> Option<RunSnapshot> {
        let runs = self.runs.lock().expect("run registry lock poisoned");
        runs.get(user_id).map(|run| run.snapshot())
    }

    /// Replay-plus-live event subscription for the user's current run.
    pub fn subscribe(&self, user_id: &str) -> Option<Subscription> {
        self.events.subscribe(user_id)
    }

    /// Launches a single-job mini-run re-attempting a failed application,
    /// reusing the profile/policy snapshot retained from the last run.
    pub async fn retry_job(
        self: &Arc<Self>,
        user_id: &str,
        job_id: &str,
    ) -> Result<(), EngineError> {
        let record = self
            .tracker
            .get(user_id, job_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("no application for job {job_id}")))?;
        if record.status != ApplicationStatus::Failed {
            return Err(EngineError::InvalidInput(format!(
                "application for job {job_id} is {}, only failed applications can be retried",
                record.status.as_str()
            )));
        }

        let run = {
            let mut runs = self.runs.lock().expect("run registry lock poisoned");
            let previous = runs.get(user_id).ok_or_else(|| {
                EngineError::NotFound(format!("no prior run for user {user_id}"))
            })?;
            if previous.status() == RunStatus::Running {
                return Err(EngineError::AlreadyRunning);
            }
            let run = Arc::new(RunState::new(
                user_id.to_string(),
                previous.profile.clone(),
                previous.policy.clone(),
            ));
            runs.insert(user_id.to_string(), run.clone());
            run
        };

        info!(user_id, job_id, "single-job retry run started");
        self.events.reset(user_id);
        self.events.publish(
            user_id,
            WorkflowEvent::WorkflowStarted {
                message: format!("Retrying application for job {job_id}"),
            },
        );

        let engine = self.clone();
        let target = job_id.to_string();
        tokio::spawn(async move { engine.drive(run, Some(target)).await });
        Ok(())
    }

    async fn drive(self: Arc<Self>, run: Arc<RunState>, target: Option<String>) {
        let user_id = run.user_id.clone();
        let outcome = self.pipeline(&run, target.as_deref()).await;

        match outcome {
            Ok(Termination::Completed { message }) => {
                run.finalize(RunStatus::Completed);
                let snapshot = run.snapshot();
                info!(
                    %user_id,
                    submitted = snapshot.submitted_count,
                    failed = snapshot.failed_count,
                    skipped = snapshot.skipped_count,
                    "workflow completed"
                );
                self.events.publish(
                    &user_id,
                    WorkflowEvent::WorkflowCompleted {
                        status: RunStatus::Completed,
                        total_submitted: snapshot.submitted_count,
                        total_failed: snapshot.failed_count,
                        total_skipped: snapshot.skipped_count,
                        message,
                    },
                );
            }
            Ok(Termination::Stopped) => {
                run.finalize(RunStatus::Stopped);
                let snapshot = run.snapshot();
                info!(%user_id, submitted = snapshot.submitted_count, "workflow stopped by kill switch");
                self.events.publish(
                    &user_id,
                    WorkflowEvent::WorkflowCompleted {
                        status: RunStatus::Stopped,
                        total_submitted: snapshot.submitted_count,
                        total_failed: snapshot.failed_count,
                        total_skipped: snapshot.skipped_count,
                        message: "Workflow stopped by kill switch".to_string(),
                    },
                );
            }
            Err(err) => {
                error!(%user_id, error = %err, "workflow failed");
                run.update(|p| p.errors.push(err.clone()));
                run.finalize(RunStatus::Failed);
                self.events
                    .publish(&user_id, WorkflowEvent::WorkflowFailed { error: err });
            }
        }

        // Keep the event channel around for late subscribers, then drop it
        // unless a newer run has taken over the user's slot.
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.post_terminal_grace).await;
            let still_current = {
                let runs = engine.runs.lock().expect("run registry lock poisoned");
                runs.get(&run.user_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &run))
            };
            if still_current {
                engine.events.remove(&run.user_id);
            }
        });
    }

    async fn pipeline(
        &self,
        run: &Arc<RunState>,
        target: Option<&str>,
    ) -> Result<Termination, String> {
        let user_id = run.user_id.as_str();

        if run.kill_requested() {
            return Ok(Termination::Stopped);
        }

        let jobs = self
            .portal
            .list_jobs(self.config.job_fetch_limit)
            .await
            .map_err(|e| format!("failed to fetch jobs from portal: {e}"))?;

        let jobs = match target {
            Some(job_id) => {
                let filtered: Vec<JobPosting> =
                    jobs.into_iter().filter(|j| j.id == job_id).collect();
                if filtered.is_empty() {
                    return Err(format!("job {job_id} is no longer listed at the portal"));
                }
                filtered
            }
            None => {
                let applied = self
                    .tracker
                    .applied_job_ids(user_id)
                    .await
                    .map_err(|e| format!("tracker unavailable: {e}"))?;
                let before = jobs.len();
                let fresh: Vec<JobPosting> = jobs
                    .into_iter()
                    .filter(|j| !applied.contains(&j.id))
                    .collect();
                debug!(
                    user_id,
                    deduplicated = before - fresh.len(),
                    "removed already-applied jobs"
                );
                fresh
            }
        };

        let ranked = self.ranker.rank(&run.profile, jobs, &run.policy).await;
        let total = ranked.queue.len();
        run.update(|p| p.total = total);
        self.events
            .publish(user_id, WorkflowEvent::JobsFetched { total_jobs: total });

        // Jobs removed by the ranker's hard filters still surface as skips.
        for (job, reason) in ranked.filtered {
            if run.kill_requested() {
                return Ok(Termination::Stopped);
            }
            self.record_skip(run, &job, reason, None, None, 0, total).await;
        }

        for (idx, matched) in ranked.queue.into_iter().enumerate() {
            let display_index = idx + 1;
            run.update(|p| p.cursor = idx);
            if run.kill_requested() {
                return Ok(Termination::Stopped);
            }

            let job = &matched.job;
            self.events.publish(
                user_id,
                WorkflowEvent::JobProcessing {
                    job: JobSummary::from_posting(
                        job,
                        Some(matched.score),
                        Some(matched.reasoning()),
                    ),
                    current_index: display_index,
                    total_jobs: total,
                },
            );

            self.stage(
                user_id,
                "policy_pre",
                format!("Checking policy for {} at {}", job.title, job.company),
                display_index,
                total,
            );
            let submitted_today = self
                .tracker
                .count_submitted_today(user_id)
                .await
                .map_err(|e| format!("tracker unavailable for daily cap check: {e}"))?;

            match pre_personalize_gate(
                &run.policy,
                job,
                matched.score,
                run.kill_requested(),
                submitted_today,
                0,
            ) {
                GateDecision::Stop(StopReason::KillRequested) => {
                    return Ok(Termination::Stopped)
                }
                GateDecision::Stop(StopReason::DailyCapReached) => {
                    info!(
                        user_id,
                        cap = run.policy.max_applications_per_day,
                        "daily application cap reached, ending run"
                    );
                    return Ok(Termination::Completed {
                        message: "Daily application cap reached".to_string(),
                    });
                }
                GateDecision::Skip(reason) => {
                    self.record_skip(
                        run,
                        job,
                        reason,
                        Some(matched.score),
                        Some(matched.reasoning()),
                        display_index,
                        total,
                    )
                    .await;
                    continue;
                }
                GateDecision::Allow => {}
            }

            self.stage(
                user_id,
                "personalizing",
                format!("Personalizing application for {} at {}", job.title, job.company),
                display_index,
                total,
            );
            let personalization = match self.personalizer.personalize(&run.profile, job).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(user_id, job_id = %job.id, error = %e, "personalization failed");
                    self.record_failure(
                        run,
                        &matched,
                        "personalization_failed".to_string(),
                        0,
                        display_index,
                        total,
                    )
                    .await;
                    continue;
                }
            };

            if run.kill_requested() {
                return Ok(Termination::Stopped);
            }

            let report = ground_claims(&run.profile, personalization.evidence_map);
            self.stage(
                user_id,
                "grounding",
                format!(
                    "Evidence grounded {} for {}",
                    report.ratio_label(),
                    job.title
                ),
                display_index,
                total,
            );
            self.stage(
                user_id,
                "policy_post",
                format!("Verifying claims for {}", job.title),
                display_index,
                total,
            );

            if let GateDecision::Skip(reason) = post_ground_gate(&report) {
                warn!(
                    user_id,
                    job_id = %job.id,
                    ungrounded = ?report.ungrounded,
                    "ungrounded claims, submission blocked"
                );
                self.record_skip(
                    run,
                    job,
                    reason,
                    Some(matched.score),
                    Some(matched.reasoning()),
                    display_index,
                    total,
                )
                .await;
                continue;
            }

            if run.kill_requested() {
                return Ok(Termination::Stopped);
            }

            let request = SubmitRequest {
                job_id: job.id.clone(),
                applicant_name: run.profile.full_name.clone(),
                applicant_email: run.profile.email.clone(),
                resume: run.profile.resume_text(),
                cover_letter: personalization.cover_letter.clone(),
                idempotency_token: SubmitRequest::idempotency_token_for(user_id, &job.id),
            };

            let events = &self.events;
            let resolution = self
                .retry
                .submit(self.portal.as_ref(), &request, run.kill_flag(), |attempt| {
                    events.publish(
                        user_id,
                        WorkflowEvent::StageUpdate {
                            stage: "submitting".to_string(),
                            stage_message: format!(
                                "Submitting application to {} (attempt {attempt})",
                                job.company
                            ),
                            current_index: display_index,
                            total_jobs: total,
                            attempt: Some(attempt),
                        },
                    );
                })
                .await;

            match resolution {
                SubmitResolution::Submitted {
                    confirmation_id,
                    attempts,
                } => {
                    let mut record = self.base_record(run, &matched);
                    record.status = ApplicationStatus::Submitted;
                    record.submitted_at = Some(Utc::now());
                    record.confirmation_id = Some(confirmation_id);
                    record.retry_count = attempts.saturating_sub(1);
                    record.cover_letter = Some(personalization.cover_letter);
                    self.record_outcome(run, record, display_index, total).await;
                }
                SubmitResolution::Duplicate {
                    confirmation_id: Some(confirmation_id),
                    attempts,
                } => {
                    // The portal already holds this application and told us
                    // which one: success-equivalent.
                    let mut record = self.base_record(run, &matched);
                    record.status = ApplicationStatus::Submitted;
                    record.submitted_at = Some(Utc::now());
                    record.confirmation_id = Some(confirmation_id);
                    record.retry_count = attempts.saturating_sub(1);
                    record.cover_letter = Some(personalization.cover_letter);
                    self.record_outcome(run, record, display_index, total).await;
                }
                SubmitResolution::Duplicate {
                    confirmation_id: None,
                    ..
                } => {
                    self.record_skip(
                        run,
                        job,
                        SkipReason::Duplicate,
                        Some(matched.score),
                        Some(matched.reasoning()),
                        display_index,
                        total,
                    )
                    .await;
                }
                SubmitResolution::Failed { error, attempts } => {
                    self.record_failure(
                        run,
                        &matched,
                        error,
                        attempts.saturating_sub(1),
                        display_index,
                        total,
                    )
                    .await;
                }
                SubmitResolution::Cancelled { attempts } => {
                    self.record_failure(
                        run,
                        &matched,
                        "cancelled".to_string(),
                        attempts.saturating_sub(1),
                        display_index,
                        total,
                    )
                    .await;
                    return Ok(Termination::Stopped);
                }
            }
        }

        Ok(Termination::Completed {
            message: "Workflow completed".to_string(),
        })
    }

    fn stage(
        &self,
        user_id: &str,
        stage: &str,
        message: String,
        current_index: usize,
        total: usize,
    ) {
        self.events.publish(
            user_id,
            WorkflowEvent::StageUpdate {
                stage: stage.to_string(),
                stage_message: message,
                current_index,
                total_jobs: total,
                attempt: None,
            },
        );
    }

    fn base_record(&self, run: &RunState, matched: &JobMatch) -> ApplicationRecord {
        let mut record = ApplicationRecord::queued(
            &run.user_id,
            &matched.job.id,
            &matched.job.title,
            &matched.job.company,
        );
        record.match_score = Some(matched.score);
        record.match_reasoning = Some(matched.reasoning());
        record
    }

    async fn record_skip(
        &self,
        run: &Arc<RunState>,
        job: &JobPosting,
        reason: SkipReason,
        match_score: Option<f32>,
        match_reasoning: Option<String>,
        display_index: usize,
        total: usize,
    ) {
        let mut record =
            ApplicationRecord::queued(&run.user_id, &job.id, &job.title, &job.company);
        record.status = ApplicationStatus::Skipped;
        record.error = Some(reason.code().to_string());
        record.match_score = match_score;
        record.match_reasoning = match_reasoning;

        if let Err(e) = self.tracker.upsert_attempt(record).await {
            warn!(user_id = %run.user_id, job_id = %job.id, error = %e, "tracker write failed for skip");
        }
        run.update(|p| p.skipped_count += 1);
        debug!(user_id = %run.user_id, job_id = %job.id, reason = reason.code(), "job skipped");
        self.events.publish(
            &run.user_id,
            WorkflowEvent::JobSkipped {
                job_id: job.id.clone(),
                job_title: job.title.clone(),
                reason: reason.code().to_string(),
                current_index: display_index,
                total_jobs: total,
            },
        );
    }

    async fn record_failure(
        &self,
        run: &Arc<RunState>,
        matched: &JobMatch,
        error: String,
        retry_count: u32,
        display_index: usize,
        total: usize,
    ) {
        let mut record = self.base_record(run, matched);
        record.status = ApplicationStatus::Failed;
        record.error = Some(error);
        record.retry_count = retry_count;
        self.record_outcome(run, record, display_index, total).await;
    }

    async fn record_outcome(
        &self,
        run: &Arc<RunState>,
        record: ApplicationRecord,
        display_index: usize,
        total: usize,
    ) {
        let stored = match self.tracker.upsert_attempt(record.clone()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    user_id = %record.user_id,
                    job_id = %record.job_id,
                    error = %e,
                    "tracker write failed, event carries the unmerged record"
                );
                record
            }
        };

        run.update(|p| match stored.status {
            ApplicationStatus::Submitted => p.submitted_count += 1,
            ApplicationStatus::Failed => {
                p.failed_count += 1;
                if let Some(error) = &stored.error {
                    p.errors.push(format!("{}: {}", stored.job_id, error));
                }
            }
            _ => {}
        });

        let snapshot = run.snapshot();
        self.events.publish(
            &run.user_id,
            WorkflowEvent::ApplicationResult {
                application: stored,
                current_index: display_index,
                total_jobs: total,
                total_submitted: snapshot.submitted_count,
                total_failed: snapshot.failed_count,
            },
        );
    }
}
