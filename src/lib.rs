#![deny(missing_docs)]

//! Core library for the Pagescout document relevance server.

/// HTTP routing and the streaming search endpoint.
pub mod api;
/// Result cache keyed by (query, document URL) with TTL expiry.
pub mod cache;
/// Per-page overlapping text windows.
pub mod chunker;
/// Environment-driven configuration management.
pub mod config;
/// Discovery client locating candidate PDF documents for a query.
pub mod discovery;
/// Embedding client abstraction and HTTP backend.
pub mod embedding;
/// Per-page PDF text extraction with a page-count cost guard.
pub mod extract;
/// PDF download with URL, size, and timeout policy.
pub mod fetcher;
/// Relevant page range inference and validation.
pub mod inference;
/// Structured logging and tracing setup.
pub mod logging;
/// Processing counters.
pub mod metrics;
/// Per-document processing pipeline.
pub mod pipeline;
/// Bounded worker pool feeding the pipeline.
pub mod pool;
/// Status event protocol multiplexing batch progress onto one stream.
pub mod protocol;
/// Relational record store for documents, chunks, and search history.
pub mod store;
/// Qdrant vector index integration.
pub mod vector;

#[cfg(test)]
pub(crate) mod pdf_fixture;
