//! Per-page overlapping text windows.
//!
//! Each page is split independently into fixed-size character windows with a
//! configured overlap between adjacent windows. Page order and within-page
//! order are preserved so reprocessing the same document is deterministic.
//! Duplicate windows within a document are dropped by content hash before
//! embedding.

use crate::extract::PageText;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

/// A bounded slice of a page's text, the unit submitted for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based page number the text came from.
    pub page: u32,
    /// Window text, trimmed.
    pub text: String,
    /// Deterministic SHA-256 digest of the text, used for dedupe.
    pub chunk_hash: String,
}

/// Errors raised when constructing a [`Chunker`].
#[derive(Debug, Error)]
pub enum ChunkerError {
    /// Window size of zero can never make progress.
    #[error("chunk window must be greater than zero")]
    ZeroWindow,
    /// Overlap must leave room for the window to advance.
    #[error("chunk overlap ({overlap}) must be smaller than the chunk window ({window})")]
    OverlapTooLarge {
        /// Configured window size in characters.
        window: usize,
        /// Configured overlap in characters.
        overlap: usize,
    },
}

/// Splits per-page text into overlapping character windows.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Chunker {
    /// Build a chunker; fails when `overlap >= window` or `window == 0`.
    pub fn new(window: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if window == 0 {
            return Err(ChunkerError::ZeroWindow);
        }
        if overlap >= window {
            return Err(ChunkerError::OverlapTooLarge { window, overlap });
        }
        Ok(Self { window, overlap })
    }

    /// Split every page into windows, preserving page and within-page order.
    ///
    /// Returns the deduplicated chunks and the number of duplicates skipped.
    pub fn split_pages(&self, pages: &[PageText]) -> (Vec<Chunk>, usize) {
        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        let mut skipped = 0;

        for page in pages {
            for text in self.windows(&page.text) {
                let hash = compute_chunk_hash(&text);
                if seen.insert(hash.clone()) {
                    chunks.push(Chunk {
                        page: page.page,
                        text,
                        chunk_hash: hash,
                    });
                } else {
                    skipped += 1;
                }
            }
        }

        (chunks, skipped)
    }

    /// Overlapping character windows over one page's text.
    fn windows(&self, text: &str) -> Vec<String> {
        let offsets: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        let total_chars = offsets.len();
        let stride = self.window - self.overlap;

        let mut out = Vec::new();
        let mut start = 0;
        while start < total_chars {
            let end = (start + self.window).min(total_chars);
            let byte_start = offsets[start];
            let byte_end = if end == total_chars {
                text.len()
            } else {
                offsets[end]
            };
            let window = text[byte_start..byte_end].trim();
            if !window.is_empty() {
                out.push(window.to_string());
            }
            if end == total_chars {
                break;
            }
            start += stride;
        }
        out
    }
}

/// Compute a deterministic SHA-256 hash for chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            page: number,
            text: text.to_string(),
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        assert!(matches!(
            Chunker::new(100, 100),
            Err(ChunkerError::OverlapTooLarge {
                window: 100,
                overlap: 100
            })
        ));
        assert!(matches!(Chunker::new(0, 0), Err(ChunkerError::ZeroWindow)));
    }

    #[test]
    fn short_page_becomes_a_single_chunk() {
        let chunker = Chunker::new(900, 200).expect("chunker");
        let (chunks, skipped) = chunker.split_pages(&[page(1, "short page text")]);
        assert_eq!(skipped, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].text, "short page text");
    }

    #[test]
    fn windows_overlap_by_the_configured_amount() {
        let chunker = Chunker::new(10, 4).expect("chunker");
        let text = "abcdefghijklmnopqrst";
        let (chunks, _) = chunker.split_pages(&[page(1, text)]);

        assert_eq!(chunks[0].text, "abcdefghij");
        // stride is window - overlap = 6
        assert_eq!(chunks[1].text, "ghijklmnop");
        assert_eq!(chunks[2].text, "mnopqrst");
    }

    #[test]
    fn preserves_page_order_across_pages() {
        let chunker = Chunker::new(900, 200).expect("chunker");
        let (chunks, _) =
            chunker.split_pages(&[page(2, "page two"), page(5, "page five"), page(9, "page nine")]);
        let pages: Vec<u32> = chunks.iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![2, 5, 9]);
    }

    #[test]
    fn duplicate_windows_are_skipped_and_counted() {
        let chunker = Chunker::new(900, 200).expect("chunker");
        let (chunks, skipped) =
            chunker.split_pages(&[page(1, "repeated text"), page(2, "repeated text")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn handles_multibyte_text_on_char_boundaries() {
        let chunker = Chunker::new(4, 1).expect("chunker");
        let (chunks, _) = chunker.split_pages(&[page(1, "héllø wörld")]);
        assert!(!chunks.is_empty());
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert!(rebuilt.contains('ø'));
    }

    #[test]
    fn chunk_hash_is_stable() {
        assert_eq!(compute_chunk_hash("abc"), compute_chunk_hash("abc"));
        assert_ne!(compute_chunk_hash("abc"), compute_chunk_hash("abd"));
    }
}
