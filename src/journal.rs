//! Sync journal: SQLite persistence of committed file metadata
//!
//! After a download's content lands on disk, the engine records the remote
//! revision tag, checksum, modtime and size here. A later sync pass compares
//! journal entries against local and remote state to decide what changed.

use std::path::Path;

use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;

/// Committed metadata for one synced file
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct JournalEntry {
    /// Normalized relative path
    pub path: String,
    /// Remote revision tag at commit time
    pub etag: String,
    /// Content checksum in `<ALGO>:<hex>` wire form, if known
    pub checksum: Option<String>,
    /// Modification time stamped on the local file (unix seconds)
    pub modtime: i64,
    /// Content size in bytes
    pub size: i64,
}

/// Handle to the sync journal database
#[derive(Clone)]
pub struct MetadataJournal {
    pool: SqlitePool,
}

impl MetadataJournal {
    /// Open (or create) a journal database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let journal = Self { pool };
        journal.migrate().await?;
        Ok(journal)
    }

    /// Open an in-memory journal (used for tests and journal-less setups).
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let journal = Self { pool };
        journal.migrate().await?;
        Ok(journal)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                etag TEXT NOT NULL,
                checksum TEXT,
                modtime INTEGER NOT NULL,
                size INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace the entry for `entry.path`.
    pub async fn record(&self, entry: &JournalEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO files (path, etag, checksum, modtime, size)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET
                 etag = excluded.etag,
                 checksum = excluded.checksum,
                 modtime = excluded.modtime,
                 size = excluded.size",
        )
        .bind(&entry.path)
        .bind(&entry.etag)
        .bind(&entry.checksum)
        .bind(entry.modtime)
        .bind(entry.size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up the committed entry for `path`.
    pub async fn lookup(&self, path: &str) -> Result<Option<JournalEntry>> {
        let entry = sqlx::query_as::<_, JournalEntry>(
            "SELECT path, etag, checksum, modtime, size FROM files WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// Remove the entry for `path`. Returns whether an entry existed.
    pub async fn forget(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close the underlying pool, flushing outstanding writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, etag: &str) -> JournalEntry {
        JournalEntry {
            path: path.to_string(),
            etag: etag.to_string(),
            checksum: Some("MD5:d41d8cd98f00b204e9800998ecf8427e".to_string()),
            modtime: 1_700_000_000,
            size: 42,
        }
    }

    #[tokio::test]
    async fn record_then_lookup_round_trips() {
        let journal = MetadataJournal::in_memory().await.unwrap();
        let original = entry("docs/a.txt", "etag-1");

        journal.record(&original).await.unwrap();

        let found = journal.lookup("docs/a.txt").await.unwrap().unwrap();
        assert_eq!(found, original);
    }

    #[tokio::test]
    async fn record_replaces_existing_entry() {
        let journal = MetadataJournal::in_memory().await.unwrap();
        journal.record(&entry("docs/a.txt", "etag-1")).await.unwrap();
        journal.record(&entry("docs/a.txt", "etag-2")).await.unwrap();

        let found = journal.lookup("docs/a.txt").await.unwrap().unwrap();
        assert_eq!(found.etag, "etag-2");
    }

    #[tokio::test]
    async fn lookup_missing_returns_none() {
        let journal = MetadataJournal::in_memory().await.unwrap();
        assert!(journal.lookup("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forget_reports_whether_entry_existed() {
        let journal = MetadataJournal::in_memory().await.unwrap();
        journal.record(&entry("docs/a.txt", "etag-1")).await.unwrap();

        assert!(journal.forget("docs/a.txt").await.unwrap());
        assert!(!journal.forget("docs/a.txt").await.unwrap());
        assert!(journal.lookup("docs/a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_creates_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("journal.db");

        let journal = MetadataJournal::open(&db_path).await.unwrap();
        journal.record(&entry("docs/a.txt", "etag-1")).await.unwrap();
        journal.close().await;

        assert!(db_path.exists());
    }
}
