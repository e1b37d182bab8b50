//! Embedding provider — the semantic half of job matching.
//!
//! Embedding computation is an external collaborator; the engine only needs
//! `embed` and cosine similarity. The default backend is Gemini's
//! text-embedding model over plain HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";
const EMBED_MODEL: &str = "models/text-embedding-004";
const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("API returned no embedding values")]
    Empty,
}

/// Swappable embedding backend, carried as `Arc<dyn EmbeddingProvider>`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

/// HTTP client for the Gemini embedding endpoint.
#[derive(Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    api_key: String,
}

impl GeminiEmbeddingClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(GEMINI_EMBED_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "model": EMBED_MODEL,
                "content": { "parts": [{ "text": text }] },
                "task_type": "RETRIEVAL_DOCUMENT",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embedding.values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        debug!(dims = parsed.embedding.values.len(), "embedding computed");
        Ok(parsed.embedding.values)
    }
}

/// Cosine similarity with a zero-norm guard.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
