use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing processing activity.
#[derive(Default)]
pub struct ProcessingMetrics {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    cache_hits: AtomicU64,
}

impl ProcessingMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that reached a relevance result.
    pub fn record_processed(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document whose pipeline ended in an error.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch entry served entirely from the result cache.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of processing counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that completed the pipeline since startup.
    pub documents_processed: u64,
    /// Documents whose pipeline ended in an error since startup.
    pub documents_failed: u64,
    /// Requests answered from the result cache since startup.
    pub cache_hits: u64,
}
