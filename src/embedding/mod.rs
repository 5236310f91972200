//! Embedding client abstraction and HTTP backend.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The HTTP layer failed before a response arrived.
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The provider answered with a non-success status.
    #[error("unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The provider returned a different number of vectors than inputs.
    #[error("provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// A returned vector does not match the configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension.
        expected: usize,
        /// Actual embedding dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embedding backend speaking the OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    /// Construct a client against the given base URL and model.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .user_agent("pagescout/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimension,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        tracing::debug!(
            model = %self.model,
            inputs = expected,
            "Generating embeddings"
        );

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let payload: EmbeddingsResponse = response.json().await?;
        if payload.data.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: payload.data.len(),
            });
        }

        let mut rows = payload.data;
        rows.sort_by_key(|row| row.index);
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            if row.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: row.embedding.len(),
                });
            }
            vectors.push(row.embedding);
        }
        Ok(vectors)
    }
}
