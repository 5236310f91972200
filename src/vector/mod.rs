//! Qdrant vector index integration.
//!
//! Chunk vectors are stored one point per chunk with a payload carrying the
//! owning document id, the 1-based page number, the chunk text, and its
//! content hash. Similarity queries are always scoped to exactly one
//! document.

pub mod client;
pub mod types;

pub use client::VectorIndex;
pub use types::{ChunkPoint, SnippetHit, VectorError};
