//! Shared types used by the vector index client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Base URL failed to parse or normalize.
    #[error("invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Prepared point ready for indexing.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Identifier of the document the chunk belongs to.
    pub document_id: String,
    /// 1-based page number the chunk came from.
    pub page: u32,
    /// Raw chunk text.
    pub text: String,
    /// Deterministic hash of the chunk used for dedupe.
    pub chunk_hash: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Scored snippet returned by a document-scoped similarity query.
#[derive(Debug, Clone)]
pub struct SnippetHit {
    /// 1-based page number stored in the point payload.
    pub page: u32,
    /// Chunk text stored in the point payload.
    pub text: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
