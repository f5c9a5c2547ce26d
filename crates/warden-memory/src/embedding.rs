//! Embedding provider trait, HTTP implementation, cosine scoring.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an embedding request failed.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The API could not be reached or answered non-2xx.
    #[error("embedding api failed: {0}")]
    Api(String),

    /// The API answered with an unusable body.
    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

/// Something that turns text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The provider name used for breaker and rate scoping.
    fn provider(&self) -> &str;

    /// The model identifier, part of the embed rate scope key.
    fn model(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// HTTP-backed embedding provider.
pub struct HttpEmbeddingProvider {
    http: reqwest::Client,
    url: String,
    model: String,
    provider: String,
}

impl HttpEmbeddingProvider {
    /// Build a provider for the configured model host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        deadline: std::time::Duration,
    ) -> Result<Self, EmbeddingError> {
        let url = url.into();
        let provider = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| "embeddings".to_string());
        let http = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;
        Ok(Self {
            http,
            url,
            model: model.into(),
            provider,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .http
            .post(&self.url)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        if parsed.embedding.is_empty() {
            return Err(EmbeddingError::Malformed("empty embedding".into()));
        }
        Ok(parsed.embedding)
    }
}

/// Cosine similarity in `[-1, 1]`. Zero for mismatched or zero-norm
/// vectors.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
