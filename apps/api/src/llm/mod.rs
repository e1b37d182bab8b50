//! LLM client for cover-letter and evidence-map generation.
//!
//! All Claude traffic flows through this one client so model choice, retry
//! behaviour, and request logging live in a single place; no other module
//! talks to the Anthropic API. The personalizer is the only caller today.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// One model for every call, fixed at compile time, so behaviour cannot
/// drift between environments.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 2048;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 500;
/// Personalization calls are short; a hung call should not stall the run.
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("reply was not the requested JSON: {0}")]
    BadJson(#[from] serde_json::Error),

    #[error("reply contained no text")]
    EmptyReply,

    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Text of the reply's first text block, if any.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .filter(|block| block.block_type == "text")
            .find_map(|block| block.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// How a single request ended, from the retry loop's point of view.
enum SendResult {
    Done(LlmResponse),
    Retryable {
        error: LlmError,
        retry_after: Option<Duration>,
    },
    Fatal(LlmError),
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Sends one prompt and returns the full response. Transport errors,
    /// 429, and 5xx are retried up to MAX_ATTEMPTS with doubling backoff;
    /// a Retry-After header overrides the backoff. Other API errors fail
    /// immediately.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.send(prompt, system).await {
                SendResult::Done(response) => {
                    debug!(
                        attempt,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "LLM call succeeded"
                    );
                    return Ok(response);
                }
                SendResult::Fatal(error) => return Err(error),
                SendResult::Retryable { error, retry_after } => {
                    warn!(attempt, error = %error, "LLM call failed");
                    last_error = Some(error);
                    if attempt < MAX_ATTEMPTS {
                        let delay = retry_after.unwrap_or_else(|| backoff(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::Exhausted {
            attempts: MAX_ATTEMPTS,
        }))
    }

    /// Calls the LLM and deserializes the reply as JSON. The prompt must
    /// instruct the model to answer with a JSON object; surrounding prose
    /// or code fences are tolerated.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let reply = self.call(prompt, system).await?;
        let text = reply.text().ok_or(LlmError::EmptyReply)?;
        serde_json::from_str(extract_json(text)).map_err(LlmError::BadJson)
    }

    async fn send(&self, prompt: &str, system: &str) -> SendResult {
        let body = ApiRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = match self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return SendResult::Retryable {
                    error: LlmError::Transport(e),
                    retry_after: None,
                }
            }
        };

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response.text().await.unwrap_or_default();
            return SendResult::Retryable {
                error: LlmError::Api {
                    status: status.as_u16(),
                    message,
                },
                retry_after,
            };
        }

        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&raw)
                .map(|envelope| envelope.error.message)
                .unwrap_or(raw);
            return SendResult::Fatal(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        match response.json::<LlmResponse>().await {
            Ok(parsed) => SendResult::Done(parsed),
            Err(e) => SendResult::Fatal(LlmError::Transport(e)),
        }
    }
}

/// Doubling backoff: 500ms, 1s, 2s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_MS << (attempt - 1).min(6))
}

/// Slices the JSON payload out of a reply that may wrap it in code fences
/// or surrounding prose: everything from the first opening brace/bracket
/// through the last closing one.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    }
}
