//! Per-document processing pipeline.
//!
//! One pipeline run takes a candidate PDF URL through fetch, extraction,
//! chunking, indexing, retrieval, and page-range inference, producing either
//! a relevance report or a tagged [`PipelineError`]. Runs are independent of
//! each other; a batch schedules them on the worker pool and multiplexes
//! their outcomes onto the status stream.

mod service;
mod types;

pub use service::{DocumentPipeline, DocumentProcessor};
pub use types::{DocumentReport, PipelineError};
