//! Local filesystem adapter: staging paths, atomic finalize, metadata commit
//!
//! Delegates stream content into a staging path; once a transfer succeeds the
//! job asks the store to finalize the item. Finalize renames the staged file
//! over the target (content becomes visible atomically) and only then commits
//! metadata to the sync journal, so a concurrent reader of the local store
//! never sees fresh metadata next to stale content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use filetime::FileTime;

use crate::config::PropagatorConfig;
use crate::journal::{JournalEntry, MetadataJournal};
use crate::types::{SyncError, SyncItem};

/// Local persistence interface used by propagation jobs.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Path where delegates stage in-progress content for `item_path`.
    fn staging_path(&self, item_path: &str) -> PathBuf;

    /// Final local path for `item_path`.
    fn target_path(&self, item_path: &str) -> PathBuf;

    /// Move staged content into place and commit the item's metadata.
    ///
    /// Staged content must already be flushed to disk (the delegate contract
    /// guarantees this). Failures are item-local metadata errors; the job
    /// records them on the item and does not retry.
    async fn finalize(&self, item: &SyncItem) -> Result<(), SyncError>;
}

/// Production [`LocalStore`] backed by the real filesystem and the sync journal.
pub struct FsLocalStore {
    local_dir: PathBuf,
    staging_dir: PathBuf,
    journal: MetadataJournal,
}

impl FsLocalStore {
    /// Create a store over explicit directories and an open journal.
    pub fn new(local_dir: PathBuf, staging_dir: PathBuf, journal: MetadataJournal) -> Self {
        Self {
            local_dir,
            staging_dir,
            journal,
        }
    }

    /// Create a store from configuration, opening the configured journal
    /// (or an in-memory one when no journal path is set).
    pub async fn from_config(config: &PropagatorConfig) -> crate::error::Result<Self> {
        let journal = match &config.journal_path {
            Some(path) => MetadataJournal::open(path).await?,
            None => MetadataJournal::in_memory().await?,
        };
        Ok(Self::new(
            config.local_dir.clone(),
            config.staging_dir.clone(),
            journal,
        ))
    }

    /// The journal this store commits metadata to.
    pub fn journal(&self) -> &MetadataJournal {
        &self.journal
    }

    fn join_relative(root: &Path, item_path: &str) -> PathBuf {
        root.join(item_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl LocalStore for FsLocalStore {
    fn staging_path(&self, item_path: &str) -> PathBuf {
        Self::join_relative(&self.staging_dir, item_path)
    }

    fn target_path(&self, item_path: &str) -> PathBuf {
        Self::join_relative(&self.local_dir, item_path)
    }

    async fn finalize(&self, item: &SyncItem) -> Result<(), SyncError> {
        let staged = self.staging_path(item.path());
        let target = self.target_path(item.path());

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::metadata(format!("create target directory: {e}")))?;
        }

        // Content first: the rename makes the finished file visible before
        // any metadata is committed for it.
        tokio::fs::rename(&staged, &target)
            .await
            .map_err(|e| SyncError::metadata(format!("move staged content into place: {e}")))?;

        let mtime = FileTime::from_unix_time(item.modtime(), 0);
        filetime::set_file_mtime(&target, mtime)
            .map_err(|e| SyncError::metadata(format!("stamp modification time: {e}")))?;

        let entry = JournalEntry {
            path: item.path().to_string(),
            etag: item.etag().to_string(),
            checksum: item.checksum().map(|c| c.to_string()),
            modtime: item.modtime(),
            size: item.size() as i64,
        };
        self.journal
            .record(&entry)
            .await
            .map_err(|e| SyncError::metadata(format!("journal commit: {e}")))?;

        tracing::debug!(path = %item.path(), etag = %item.etag(), "metadata committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    async fn store_in(dir: &Path) -> FsLocalStore {
        let journal = MetadataJournal::in_memory().await.unwrap();
        FsLocalStore::new(dir.join("sync"), dir.join("staging"), journal)
    }

    fn item() -> SyncItem {
        SyncItem::new("docs/report.txt", "etag-9", 7, 1_700_000_123)
    }

    #[tokio::test]
    async fn finalize_moves_content_and_commits_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let item = item();

        let staged = store.staging_path(item.path());
        tokio::fs::create_dir_all(staged.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&staged, b"content").await.unwrap();

        store.finalize(&item).await.unwrap();

        let target = store.target_path(item.path());
        assert_eq!(std::fs::read(&target).unwrap(), b"content");
        assert!(!staged.exists(), "staged file should have been moved");

        let meta = std::fs::metadata(&target).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_700_000_123);

        let entry = store
            .journal()
            .lookup("docs/report.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.etag, "etag-9");
        assert_eq!(entry.size, 7);
    }

    #[tokio::test]
    async fn finalize_without_staged_content_is_a_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let error = store.finalize(&item()).await.unwrap_err();

        assert_eq!(error.kind, ErrorKind::Metadata);
        assert!(
            store.journal().lookup("docs/report.txt").await.unwrap().is_none(),
            "no metadata may be committed when content never landed"
        );
    }

    #[test]
    fn paths_are_rooted_and_normalized() {
        let journal_fut = MetadataJournal::in_memory();
        let journal = tokio_test::block_on(journal_fut).unwrap();
        let store = FsLocalStore::new(
            PathBuf::from("/data/sync"),
            PathBuf::from("/data/partial"),
            journal,
        );

        assert_eq!(
            store.target_path("/docs/a.txt"),
            PathBuf::from("/data/sync/docs/a.txt")
        );
        assert_eq!(
            store.staging_path("docs/a.txt"),
            PathBuf::from("/data/partial/docs/a.txt")
        );
    }
}
