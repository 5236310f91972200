//! Relational record store for documents, chunks, and search history.
//!
//! Backed by SQLite through sqlx. Document identity is the URL: creation is
//! an upsert keyed by a uniqueness constraint, so two pipelines racing on the
//! same new URL both end up with the winner's row id. Chunk sets are written
//! inside one transaction and never repeated for a document that already has
//! chunks.

use crate::chunker::Chunk;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A persisted document row.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Stable identifier assigned at creation.
    pub id: String,
    /// Document title derived from the URL at creation time.
    pub title: String,
}

/// One recorded search, newest first in listings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHistoryEntry {
    /// The query text.
    pub query: String,
    /// The grade/category filter in effect, `ALL` when none.
    pub filter: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// Handle to the SQLite record store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `database_url` and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if let Some(path) = database_url.strip_prefix("sqlite:")
            && path != ":memory:"
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                page_count INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                chunk_hash TEXT NOT NULL,
                UNIQUE(document_id, chunk_hash),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                filter TEXT NOT NULL DEFAULT 'ALL',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create the document row for `url`, or return the existing one.
    ///
    /// The URL uniqueness constraint makes this safe under concurrent
    /// creation: the loser reuses the winner's identity and title.
    pub async fn upsert_document(
        &self,
        url: &str,
        title: &str,
    ) -> Result<DocumentRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (id, url, title, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(url) DO UPDATE SET url = excluded.url
            RETURNING id, title
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(url)
        .bind(title)
        .bind(now_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(DocumentRecord {
            id: row.get("id"),
            title: row.get("title"),
        })
    }

    /// Record the structural page count observed during extraction.
    pub async fn set_page_count(&self, document_id: &str, pages: usize) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET page_count = ?1 WHERE id = ?2")
            .bind(pages as i64)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of chunk rows recorded for a document.
    pub async fn chunk_count(&self, document_id: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Write the chunk set for a document in one transaction, unless one
    /// already exists.
    ///
    /// Returns `true` only when this call actually inserted rows. The first
    /// statement inside the transaction is a write, so a racing writer
    /// blocks on the database write lock instead of reading a stale
    /// snapshot; the loser's `INSERT OR IGNORE` rows all collide with the
    /// per-document `chunk_hash` uniqueness constraint and it reports
    /// `false`.
    pub async fn insert_chunks_if_absent(
        &self,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<bool, StoreError> {
        if self.chunk_count(document_id).await? > 0 {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in chunks {
            inserted += sqlx::query(
                r#"
                INSERT OR IGNORE INTO chunks (document_id, page_number, text, chunk_hash)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(document_id)
            .bind(chunk.page as i64)
            .bind(&chunk.text)
            .bind(&chunk.chunk_hash)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        Ok(inserted > 0)
    }

    /// Log one search request.
    pub async fn record_search(&self, query: &str, filter: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO search_history (query, filter, created_at) VALUES (?1, ?2, ?3)")
            .bind(query)
            .bind(filter.unwrap_or("ALL"))
            .bind(now_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent searches, newest first.
    pub async fn recent_searches(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT query, filter, created_at FROM search_history ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHistoryEntry {
                query: row.get("query"),
                filter: row.get("filter"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::compute_chunk_hash;

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite:{}/store.db", dir.path().display());
        let store = Store::connect(&url).await.expect("connect");
        (dir, store)
    }

    fn chunk(page: u32, text: &str) -> Chunk {
        Chunk {
            page,
            text: text.to_string(),
            chunk_hash: compute_chunk_hash(text),
        }
    }

    #[tokio::test]
    async fn upsert_reuses_the_existing_document_identity() {
        let (_dir, store) = temp_store().await;
        let first = store
            .upsert_document("https://example.org/a.pdf", "a.pdf")
            .await
            .expect("first upsert");
        let second = store
            .upsert_document("https://example.org/a.pdf", "other title")
            .await
            .expect("second upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "a.pdf");
    }

    #[tokio::test]
    async fn chunk_set_is_written_once() {
        let (_dir, store) = temp_store().await;
        let doc = store
            .upsert_document("https://example.org/a.pdf", "a.pdf")
            .await
            .expect("upsert");

        let chunks = vec![chunk(1, "alpha"), chunk(2, "beta")];
        assert!(
            store
                .insert_chunks_if_absent(&doc.id, &chunks)
                .await
                .expect("first write")
        );
        assert!(
            !store
                .insert_chunks_if_absent(&doc.id, &chunks)
                .await
                .expect("second write")
        );
        assert_eq!(store.chunk_count(&doc.id).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn concurrent_writers_commit_the_chunk_set_exactly_once() {
        let (_dir, store) = temp_store().await;
        let doc = store
            .upsert_document("https://example.org/a.pdf", "a.pdf")
            .await
            .expect("upsert");

        let chunks = vec![chunk(1, "alpha"), chunk(2, "beta"), chunk(3, "gamma")];
        let (first, second) = tokio::join!(
            store.insert_chunks_if_absent(&doc.id, &chunks),
            store.insert_chunks_if_absent(&doc.id, &chunks),
        );
        let first = first.expect("first writer");
        let second = second.expect("second writer");

        assert!(first ^ second, "exactly one writer commits the set");
        assert_eq!(store.chunk_count(&doc.id).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn duplicate_hashes_never_produce_duplicate_rows() {
        let (_dir, store) = temp_store().await;
        let doc = store
            .upsert_document("https://example.org/a.pdf", "a.pdf")
            .await
            .expect("upsert");

        let chunks = vec![chunk(1, "same"), chunk(2, "same")];
        store
            .insert_chunks_if_absent(&doc.id, &chunks)
            .await
            .expect("write");
        assert_eq!(store.chunk_count(&doc.id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn search_history_lists_newest_first() {
        let (_dir, store) = temp_store().await;
        store.record_search("fractions", None).await.expect("one");
        store
            .record_search("multiplication", Some("2"))
            .await
            .expect("two");

        let entries = store.recent_searches(20).await.expect("list");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].query, "multiplication");
        assert_eq!(entries[0].filter, "2");
        assert_eq!(entries[1].filter, "ALL");
    }
}
