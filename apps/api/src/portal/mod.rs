//! Portal adapter — the HTTP client for the upstream job portal.
//!
//! The portal is an external collaborator with a small contract: list jobs,
//! submit an application, read one back. Submission results are classified
//! into an explicit outcome taxonomy so the retry executor never has to
//! guess from error strings.

pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::job::JobPosting;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("portal error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// A submission attempt's payload. The idempotency token is stable per
/// (user, job) so repeated attempts never create duplicate records
/// portal-side.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub job_id: String,
    pub applicant_name: String,
    pub applicant_email: String,
    pub resume: String,
    pub cover_letter: String,
    #[serde(rename = "client_token")]
    pub idempotency_token: String,
}

impl SubmitRequest {
    /// Deterministic per-(user, job) token: the same pair always produces
    /// the same UUID, so a retried attempt is recognizable portal-side.
    pub fn idempotency_token_for(user_id: &str, job_id: &str) -> String {
        Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{user_id}/{job_id}").as_bytes(),
        )
        .to_string()
    }
}

/// Classification of a single submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Terminal success.
    Submitted { confirmation_id: String },
    /// The portal already has this application. Success-equivalent.
    DuplicateAtPortal { confirmation_id: Option<String> },
    /// Connection-level failure. Retryable.
    TransientNetwork { message: String },
    /// HTTP 5xx. Retryable.
    Transient5xx { status: u16 },
    /// HTTP 429, with the parsed Retry-After hint if the portal sent one.
    RateLimited { retry_after: Option<Duration> },
    /// Any other 4xx. Terminal failure; never promoted to success.
    PermanentClient { status: u16, message: String },
    /// Response read timed out. Retryable once, then permanent.
    Timeout,
}

/// Fields we read from a successful submission response. Unknown fields are
/// tolerated.
#[derive(Debug, Deserialize)]
struct SubmitResponseBody {
    #[serde(default)]
    confirmation_id: Option<String>,
    #[serde(default)]
    application_id: Option<String>,
}

/// A portal-side application record, used only for reconciliation.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalApplication {
    pub confirmation_id: String,
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

#[async_trait]
pub trait Portal: Send + Sync {
    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobPosting>, PortalError>;
    async fn submit(&self, request: &SubmitRequest) -> SubmitOutcome;
    async fn get_application(
        &self,
        confirmation_id: &str,
    ) -> Result<PortalApplication, PortalError>;
}

/// Reqwest-backed portal client.
#[derive(Clone)]
pub struct HttpPortalClient {
    client: Client,
    base_url: String,
}

impl HttpPortalClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// The portal wraps job lists either as `{"jobs": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobsResponse {
    Wrapped { jobs: Vec<JobPosting> },
    Bare(Vec<JobPosting>),
}

#[async_trait]
impl Portal for HttpPortalClient {
    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobPosting>, PortalError> {
        let response = self
            .client
            .get(format!("{}/api/jobs", self.base_url))
            .query(&[("limit", limit)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let jobs = match response.json::<JobsResponse>().await? {
            JobsResponse::Wrapped { jobs } => jobs,
            JobsResponse::Bare(jobs) => jobs,
        };
        debug!(count = jobs.len(), "jobs fetched from portal");
        Ok(jobs)
    }

    async fn submit(&self, request: &SubmitRequest) -> SubmitOutcome {
        let response = self
            .client
            .post(format!("{}/api/applications", self.base_url))
            .json(request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return SubmitOutcome::Timeout,
            Err(e) => {
                return SubmitOutcome::TransientNetwork {
                    message: e.to_string(),
                }
            }
        };

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        classify_submit_response(status, retry_after, &body, &request.job_id)
    }

    async fn get_application(
        &self,
        confirmation_id: &str,
    ) -> Result<PortalApplication, PortalError> {
        let response = self
            .client
            .get(format!(
                "{}/api/applications/{confirmation_id}",
                self.base_url
            ))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response.json().await?)
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pure status→outcome mapping, shared by the client and its tests.
fn classify_submit_response(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    job_id: &str,
) -> SubmitOutcome {
    if status.is_success() {
        let parsed: SubmitResponseBody = serde_json::from_str(body).unwrap_or(SubmitResponseBody {
            confirmation_id: None,
            application_id: None,
        });
        let confirmation_id = parsed
            .confirmation_id
            .or(parsed.application_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("conf-{job_id}"));
        return SubmitOutcome::Submitted { confirmation_id };
    }

    match status.as_u16() {
        409 => {
            let parsed: Option<SubmitResponseBody> = serde_json::from_str(body).ok();
            SubmitOutcome::DuplicateAtPortal {
                confirmation_id: parsed
                    .and_then(|p| p.confirmation_id.or(p.application_id))
                    .filter(|id| !id.is_empty()),
            }
        }
        429 => SubmitOutcome::RateLimited { retry_after },
        code if status.is_server_error() => {
            warn!(status = code, "portal returned server error");
            SubmitOutcome::Transient5xx { status: code }
        }
        code => SubmitOutcome::PermanentClient {
            status: code,
            message: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_with_confirmation_id() {
        let outcome = classify_submit_response(
            StatusCode::CREATED,
            None,
            r#"{"success": true, "confirmation_id": "APP-123", "status": "received"}"#,
            "J1",
        );
        assert_eq!(
            outcome,
            SubmitOutcome::Submitted {
                confirmation_id: "APP-123".to_string()
            }
        );
    }

    #[test]
    fn test_success_without_id_falls_back_to_job_scoped_id() {
        let outcome =
            classify_submit_response(StatusCode::OK, None, r#"{"success": true}"#, "J7");
        assert_eq!(
            outcome,
            SubmitOutcome::Submitted {
                confirmation_id: "conf-J7".to_string()
            }
        );
    }

    #[test]
    fn test_conflict_maps_to_duplicate() {
        let outcome = classify_submit_response(
            StatusCode::CONFLICT,
            None,
            r#"{"error": "duplicate_application", "message": "already applied"}"#,
            "J1",
        );
        assert_eq!(
            outcome,
            SubmitOutcome::DuplicateAtPortal {
                confirmation_id: None
            }
        );
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let outcome = classify_submit_response(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(3)),
            "",
            "J1",
        );
        assert_eq!(
            outcome,
            SubmitOutcome::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
    }

    #[test]
    fn test_5xx_is_transient() {
        let outcome =
            classify_submit_response(StatusCode::SERVICE_UNAVAILABLE, None, "oops", "J1");
        assert_eq!(outcome, SubmitOutcome::Transient5xx { status: 503 });
    }

    #[test]
    fn test_other_4xx_is_permanent_and_never_promoted() {
        let outcome = classify_submit_response(
            StatusCode::BAD_REQUEST,
            None,
            r#"{"error": "missing_resume"}"#,
            "J1",
        );
        match outcome {
            SubmitOutcome::PermanentClient { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("missing_resume"));
            }
            other => panic!("expected PermanentClient, got {other:?}"),
        }
    }

    #[test]
    fn test_idempotency_token_is_stable() {
        let a = SubmitRequest::idempotency_token_for("u1", "J1");
        let b = SubmitRequest::idempotency_token_for("u1", "J1");
        assert_eq!(a, b);
        assert_ne!(a, SubmitRequest::idempotency_token_for("u1", "J2"));
    }

    #[test]
    fn test_jobs_response_accepts_both_shapes() {
        let wrapped: JobsResponse =
            serde_json::from_str(r#"{"jobs": [{"id": "J1", "title": "T", "company": "C"}]}"#)
                .unwrap();
        let bare: JobsResponse =
            serde_json::from_str(r#"[{"id": "J1", "title": "T", "company": "C"}]"#).unwrap();
        for response in [wrapped, bare] {
            let jobs = match response {
                JobsResponse::Wrapped { jobs } => jobs,
                JobsResponse::Bare(jobs) => jobs,
            };
            assert_eq!(jobs.len(), 1);
        }
    }
}
