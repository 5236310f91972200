//! Pipeline outcome types and the tagged error taxonomy.

use crate::embedding::EmbeddingError;
use crate::extract::ExtractError;
use crate::fetcher::FetchError;
use crate::inference::{InferenceError, PageRange};
use crate::pool::PoolError;
use crate::store::StoreError;
use crate::vector::VectorError;
use thiserror::Error;

/// Successful outcome of one document pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    /// Stable document identifier.
    pub document_id: String,
    /// Document title.
    pub title: String,
    /// The inferred relevant page range.
    pub relevancy_report: PageRange,
    /// Whether the report was served from the result cache.
    pub from_cache: bool,
}

/// Anything that can go wrong while processing one document.
///
/// Every variant maps to a stable machine-readable tag carried on the status
/// stream, so clients can distinguish failure classes without parsing
/// messages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Downloading the PDF failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Parsing or extracting the PDF failed.
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    /// The document produced no usable text.
    #[error("document contains no extractable text")]
    EmptyDocument,
    /// Writing document or chunk records failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Producing embeddings failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Writing chunk vectors to the index failed.
    #[error("vector indexing failed: {0}")]
    Index(VectorError),
    /// The document-scoped similarity query failed.
    #[error("snippet retrieval failed: {0}")]
    Retrieval(VectorError),
    /// Retrieval produced no snippets to ground inference on.
    #[error("no indexed snippets were retrieved for the document")]
    NoSnippets,
    /// Page-range inference failed or produced an invalid range.
    #[error(transparent)]
    Inference(#[from] InferenceError),
    /// The worker running the pipeline failed before finishing.
    #[error(transparent)]
    Worker(#[from] PoolError),
}

impl PipelineError {
    /// Stable tag identifying the failure class on the status stream.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch_error",
            Self::Extraction(ExtractError::TooLarge { .. }) => "document_too_large",
            Self::Extraction(_) => "extraction_error",
            Self::EmptyDocument => "empty_document",
            Self::Store(_) | Self::Embedding(_) | Self::Index(_) => "indexing_error",
            Self::Retrieval(_) | Self::NoSnippets => "retrieval_error",
            Self::Inference(InferenceError::InvalidRange { .. }) => "invalid_inference",
            Self::Inference(_) => "inference_error",
            Self::Worker(_) => "worker_failed",
        }
    }
}
