//! Per-page PDF text extraction.
//!
//! Extraction runs in two phases. A structural parse first exposes the page
//! count so documents above the configured ceiling are rejected before any
//! text work is spent. The full per-page pass then runs on a blocking thread
//! under a hard wall-clock ceiling: if the parser stalls, the pages
//! accumulated so far are returned instead of hanging the pipeline. Pages
//! that yield no text are omitted from the output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task;

/// Plain text extracted from a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number in the source document.
    pub page: u32,
    /// Trimmed text content of the page; never empty.
    pub text: String,
}

/// Result of extracting one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Total number of pages in the document structure.
    pub page_count: usize,
    /// Non-empty pages in ascending page order.
    pub pages: Vec<PageText>,
}

/// Errors raised while parsing a PDF.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The byte buffer is not a parseable PDF.
    #[error("failed to parse PDF: {0}")]
    Malformed(#[from] lopdf::Error),
    /// The document exceeds the configured page-count ceiling.
    #[error("document has {pages} pages, above the {limit}-page ceiling")]
    TooLarge {
        /// Page count reported by the document structure.
        pages: usize,
        /// Configured ceiling.
        limit: usize,
    },
    /// The extraction worker terminated without reporting a result.
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Parses raw PDF bytes into per-page plain text.
pub struct TextExtractor {
    max_pages: usize,
    timeout: Duration,
}

impl TextExtractor {
    /// Build an extractor with the given page-count ceiling and wall-clock ceiling.
    pub fn new(max_pages: usize, timeout: Duration) -> Self {
        Self { max_pages, timeout }
    }

    /// Extract per-page text from `bytes`.
    ///
    /// Fails fast with [`ExtractError::TooLarge`] when the page count exceeds
    /// the ceiling. The per-page pass is bounded by the configured timeout;
    /// on expiry the pages collected so far are returned.
    pub async fn extract(&self, bytes: Vec<u8>) -> Result<Extraction, ExtractError> {
        let document = task::spawn_blocking(move || lopdf::Document::load_mem(&bytes))
            .await
            .map_err(join_failure)??;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let page_count = page_numbers.len();
        if page_count > self.max_pages {
            return Err(ExtractError::TooLarge {
                pages: page_count,
                limit: self.max_pages,
            });
        }

        let collected: Arc<Mutex<Vec<PageText>>> = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker = task::spawn_blocking({
            let collected = Arc::clone(&collected);
            let cancelled = Arc::clone(&cancelled);
            move || {
                for page in page_numbers {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    match document.extract_text(&[page]) {
                        Ok(text) => {
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                let mut pages = collected
                                    .lock()
                                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                                pages.push(PageText {
                                    page,
                                    text: trimmed.to_string(),
                                });
                            }
                        }
                        Err(error) => {
                            tracing::warn!(page, error = %error, "Skipping page with unextractable text");
                        }
                    }
                }
            }
        });

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(join) => join.map_err(join_failure)?,
            Err(_) => {
                cancelled.store(true, Ordering::Relaxed);
                tracing::warn!(
                    page_count,
                    timeout_secs = self.timeout.as_secs(),
                    "Extraction hit its wall-clock ceiling; returning accumulated pages"
                );
            }
        }

        let pages = std::mem::take(
            &mut *collected
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        tracing::debug!(page_count, extracted = pages.len(), "Extracted document text");
        Ok(Extraction { page_count, pages })
    }
}

fn join_failure(err: task::JoinError) -> ExtractError {
    ExtractError::Worker(err.to_string())
}
