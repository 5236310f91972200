//! TTL cache for finished relevance reports.
//!
//! Keyed by `search:{query}:{url}`, so a repeated query against a document
//! already analysed for it skips the whole pipeline. Entries expire after a
//! configurable TTL; expired entries are dropped lazily on read and swept
//! opportunistically on write.

use crate::inference::PageRange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A cached per-document relevance outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedReport {
    /// Stable document identifier.
    pub document_id: String,
    /// Document title.
    pub title: String,
    /// The inferred relevant page range.
    pub relevancy_report: PageRange,
}

struct Entry {
    report: CachedReport,
    expires_at: Instant,
}

/// In-process TTL cache of relevance reports. Cheap to share behind an `Arc`.
pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

/// Build the cache key for a query/document pair.
pub fn cache_key(query: &str, url: &str) -> String {
    format!("search:{query}:{url}")
}

impl ResultCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a report, dropping it if it has expired.
    pub async fn get(&self, key: &str) -> Option<CachedReport> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.report.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: take the write lock to remove it.
        self.entries.write().await.remove(key);
        None
    }

    /// Store a report under `key`, refreshing any existing entry.
    pub async fn set(&self, key: &str, report: CachedReport) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                report,
                expires_at: now + self.ttl,
            },
        );
    }
}
