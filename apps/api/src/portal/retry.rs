//! Retry executor — wraps a single submission in bounded, kill-aware retry.
//!
//! Backoff: base * 2^(attempt-1) plus uniform jitter in [0, base], capped.
//! A RateLimited outcome overrides backoff with the portal's Retry-After
//! hint. The kill flag is observed before every attempt and inside every
//! sleep on the configured poll cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::{Portal, SubmitOutcome, SubmitRequest};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    /// How often sleeps re-check the kill flag.
    pub kill_poll_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
            kill_poll_interval: Duration::from_millis(2000),
        }
    }
}

/// What the engine records after the executor gives up or succeeds.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResolution {
    Submitted {
        confirmation_id: String,
        attempts: u32,
    },
    /// The portal already had this application.
    Duplicate {
        confirmation_id: Option<String>,
        attempts: u32,
    },
    Failed {
        error: String,
        attempts: u32,
    },
    /// The kill switch fired before or between attempts.
    Cancelled {
        attempts: u32,
    },
}

pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Drives `portal.submit` to a terminal resolution. `on_attempt` fires
    /// before each attempt (the engine publishes a stage event from it).
    ///
    /// An attempt already in flight when the kill switch fires is allowed to
    /// finish: if the portal committed, abandoning the response would strand
    /// a submitted application.
    pub async fn submit<F>(
        &self,
        portal: &dyn Portal,
        request: &SubmitRequest,
        kill: &AtomicBool,
        mut on_attempt: F,
    ) -> SubmitResolution
    where
        F: FnMut(u32),
    {
        let max = self.config.max_attempts.max(1);
        let mut timeout_seen = false;
        let mut last_error = String::new();

        for attempt in 1..=max {
            if kill.load(Ordering::Relaxed) {
                return SubmitResolution::Cancelled {
                    attempts: attempt - 1,
                };
            }

            on_attempt(attempt);
            let mut rate_limit_hint: Option<Duration> = None;

            match portal.submit(request).await {
                SubmitOutcome::Submitted { confirmation_id } => {
                    if attempt > 1 {
                        debug!(attempt, "submission succeeded after retries");
                    }
                    return SubmitResolution::Submitted {
                        confirmation_id,
                        attempts: attempt,
                    };
                }
                SubmitOutcome::DuplicateAtPortal { confirmation_id } => {
                    return SubmitResolution::Duplicate {
                        confirmation_id,
                        attempts: attempt,
                    };
                }
                SubmitOutcome::PermanentClient { status, message } => {
                    return SubmitResolution::Failed {
                        error: format!("portal rejected submission ({status}): {message}"),
                        attempts: attempt,
                    };
                }
                SubmitOutcome::Timeout => {
                    if timeout_seen {
                        return SubmitResolution::Failed {
                            error: "portal timed out on consecutive attempts".to_string(),
                            attempts: attempt,
                        };
                    }
                    timeout_seen = true;
                    last_error = "portal response timed out".to_string();
                }
                SubmitOutcome::TransientNetwork { message } => {
                    last_error = format!("network error: {message}");
                }
                SubmitOutcome::Transient5xx { status } => {
                    last_error = format!("portal server error ({status})");
                }
                SubmitOutcome::RateLimited { retry_after } => {
                    last_error = "portal rate limited".to_string();
                    rate_limit_hint = retry_after;
                }
            }

            if attempt == max {
                break;
            }

            let mut delay = self.backoff_delay(attempt);
            if let Some(hint) = rate_limit_hint {
                // Honour the portal's hint even when it exceeds our backoff.
                delay = delay.max(hint);
            }
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "submission attempt failed, backing off"
            );
            if !sleep_unless_killed(delay, kill, self.config.kill_poll_interval).await {
                return SubmitResolution::Cancelled { attempts: attempt };
            }
        }

        SubmitResolution::Failed {
            error: format!("submission failed after {max} attempts: {last_error}"),
            attempts: max,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .base
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX));
        let jitter_ms = if self.config.base.as_millis() > 0 {
            rand::random::<u64>() % (self.config.base.as_millis() as u64 + 1)
        } else {
            0
        };
        (exp + Duration::from_millis(jitter_ms)).min(self.config.cap)
    }
}

/// Sleeps `total`, waking every `poll` to check the kill flag. Returns false
/// if the kill switch fired before the sleep finished.
async fn sleep_unless_killed(total: Duration, kill: &AtomicBool, poll: Duration) -> bool {
    let poll = poll.max(Duration::from_millis(1));
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if kill.load(Ordering::Relaxed) {
            return false;
        }
        let chunk = remaining.min(poll);
        tokio::time::sleep(chunk).await;
        remaining = remaining.saturating_sub(chunk);
    }
    !kill.load(Ordering::Relaxed)
}
