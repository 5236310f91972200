//! The document pipeline service.

use super::types::{DocumentReport, PipelineError};
use crate::cache::{CachedReport, ResultCache, cache_key};
use crate::chunker::Chunker;
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::extract::TextExtractor;
use crate::fetcher::PdfFetcher;
use crate::inference::{RelevanceInferencer, Snippet, validate_page_range};
use crate::metrics::ProcessingMetrics;
use crate::store::Store;
use crate::vector::{ChunkPoint, VectorIndex};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Seam between the batch scheduler and the per-document work, mockable in
/// stream-level tests.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Produce a relevance report for `url` against `query`.
    async fn process_document(
        &self,
        query: &str,
        url: &str,
        title: &str,
    ) -> Result<DocumentReport, PipelineError>;
}

/// Production pipeline wiring fetch, extraction, chunking, indexing,
/// retrieval, and inference together.
pub struct DocumentPipeline {
    fetcher: PdfFetcher,
    extractor: TextExtractor,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingClient>,
    vectors: Arc<VectorIndex>,
    collection: String,
    store: Store,
    inferencer: Arc<dyn RelevanceInferencer>,
    cache: Arc<ResultCache>,
    metrics: Arc<ProcessingMetrics>,
    top_k: usize,
}

impl DocumentPipeline {
    /// Assemble a pipeline from its already-configured parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: PdfFetcher,
        extractor: TextExtractor,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingClient>,
        vectors: Arc<VectorIndex>,
        collection: String,
        store: Store,
        inferencer: Arc<dyn RelevanceInferencer>,
        cache: Arc<ResultCache>,
        metrics: Arc<ProcessingMetrics>,
        top_k: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            chunker,
            embedder,
            vectors,
            collection,
            store,
            inferencer,
            cache,
            metrics,
            top_k,
        }
    }

    async fn run(
        &self,
        query: &str,
        url: &str,
        title: &str,
    ) -> Result<DocumentReport, PipelineError> {
        let bytes = self.fetcher.fetch(url).await?;
        let extraction = self.extractor.extract(bytes).await?;
        if extraction.pages.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let document = self.store.upsert_document(url, title).await?;
        self.store
            .set_page_count(&document.id, extraction.page_count)
            .await?;

        let (chunks, skipped) = self.chunker.split_pages(&extraction.pages);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        debug!(
            document_id = %document.id,
            chunks = chunks.len(),
            duplicates_skipped = skipped,
            "Chunked document"
        );

        // Embeddings and vectors land before any chunk rows: the committed
        // chunk set is the marker that indexing finished, so a failure here
        // leaves the document retryable. Point ids are deterministic, which
        // makes a racing double-upsert overwrite instead of duplicate.
        if self.store.chunk_count(&document.id).await? > 0 {
            debug!(document_id = %document.id, "Document already indexed; skipping embedding");
        } else {
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            let points: Vec<ChunkPoint> = chunks
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| ChunkPoint {
                    document_id: document.id.clone(),
                    page: chunk.page,
                    text: chunk.text.clone(),
                    chunk_hash: chunk.chunk_hash.clone(),
                    vector,
                })
                .collect();
            self.vectors
                .upsert_chunks(&self.collection, points)
                .await
                .map_err(PipelineError::Index)?;
            let wrote = self
                .store
                .insert_chunks_if_absent(&document.id, &chunks)
                .await?;
            if !wrote {
                debug!(document_id = %document.id, "Concurrent writer committed the chunk set first");
            }
        }

        let query_vector = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;
        let hits = self
            .vectors
            .query_document(&self.collection, query_vector, &document.id, self.top_k)
            .await
            .map_err(PipelineError::Retrieval)?;
        if hits.is_empty() {
            return Err(PipelineError::NoSnippets);
        }

        let snippets: Vec<Snippet> = hits
            .iter()
            .map(|hit| Snippet {
                page: hit.page,
                text: hit.text.clone(),
            })
            .collect();
        let evidence_pages: BTreeSet<u32> = snippets.iter().map(|snippet| snippet.page).collect();
        let range = self.inferencer.infer_page_range(query, &snippets).await?;
        validate_page_range(&range, &evidence_pages)?;

        self.cache
            .set(
                &cache_key(query, url),
                CachedReport {
                    document_id: document.id.clone(),
                    title: document.title.clone(),
                    relevancy_report: range.clone(),
                },
            )
            .await;

        Ok(DocumentReport {
            document_id: document.id,
            title: document.title,
            relevancy_report: range,
            from_cache: false,
        })
    }
}

#[async_trait]
impl DocumentProcessor for DocumentPipeline {
    #[instrument(skip(self), fields(url = %url))]
    async fn process_document(
        &self,
        query: &str,
        url: &str,
        title: &str,
    ) -> Result<DocumentReport, PipelineError> {
        if let Some(hit) = self.cache.get(&cache_key(query, url)).await {
            self.metrics.record_cache_hit();
            info!(document_id = %hit.document_id, "Serving relevance report from cache");
            return Ok(DocumentReport {
                document_id: hit.document_id,
                title: hit.title,
                relevancy_report: hit.relevancy_report,
                from_cache: true,
            });
        }

        match self.run(query, url, title).await {
            Ok(report) => {
                self.metrics.record_processed();
                info!(
                    document_id = %report.document_id,
                    start_page = report.relevancy_report.start_page,
                    end_page = report.relevancy_report.end_page,
                    "Document processed"
                );
                Ok(report)
            }
            Err(error) => {
                self.metrics.record_failed();
                warn!(tag = error.tag(), error = %error, "Document pipeline failed");
                Err(error)
            }
        }
    }
}
