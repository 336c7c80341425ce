//! Core types for sync-propagator

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

/// Per-item sync status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Created, not yet dispatched
    Pending,
    /// Dispatched to the transfer delegate or decrypt path
    InProgress,
    /// Content transferred and metadata committed
    Success,
    /// Failed; see the item's recorded [`SyncError`]
    Error,
    /// Cancelled before or during transfer
    Aborted,
}

impl ItemStatus {
    /// Whether this status is terminal (the item will not be touched again).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Success | ItemStatus::Error | ItemStatus::Aborted
        )
    }
}

/// Item-local failure taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Transfer failed or timed out
    Network,
    /// Content could not be decrypted
    Decryption,
    /// Local metadata commit failed after content was written
    Metadata,
    /// Bulk response malformed or item missing from the response
    Protocol,
    /// Batch-level cancellation
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Decryption => "decryption",
            ErrorKind::Metadata => "metadata",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Error recorded on a failed item
///
/// These never unwind a job; they are stored on the item so the orchestrator
/// can produce a per-file error report after the batch finishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl SyncError {
    /// Create an error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`ErrorKind::Network`] error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Shorthand for a [`ErrorKind::Decryption`] error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decryption, message)
    }

    /// Shorthand for a [`ErrorKind::Metadata`] error.
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Metadata, message)
    }

    /// Shorthand for a [`ErrorKind::Protocol`] error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// Shorthand for a [`ErrorKind::Aborted`] error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Aborted, message)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// Combined outcome of a batch or directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    /// Every item finished with [`ItemStatus::Success`]
    Success,
    /// At least one item ended in Error or Aborted
    Error,
    /// Batch-level cancellation was requested
    Aborted,
}

/// One file's sync unit for a single propagation pass.
///
/// Created by the orchestrator, shared as `Arc<SyncItem>` with the single job
/// processing it. The job mutates status/error through interior mutability;
/// the orchestrator reads the terminal result after the job reports done.
#[derive(Debug)]
pub struct SyncItem {
    path: String,
    etag: String,
    size: u64,
    modtime: i64,
    checksum: Option<Checksum>,
    state: Mutex<ItemState>,
}

#[derive(Debug)]
struct ItemState {
    status: ItemStatus,
    error: Option<SyncError>,
    encrypted: bool,
}

impl SyncItem {
    /// Create a pending item for one remote file.
    ///
    /// `path` is the normalized relative path (the item's identity inside a
    /// batch), `etag` the opaque remote revision tag, `modtime` the remote
    /// modification time in unix seconds.
    pub fn new(path: impl Into<String>, etag: impl Into<String>, size: u64, modtime: i64) -> Self {
        Self {
            path: path.into(),
            etag: etag.into(),
            size,
            modtime,
            checksum: None,
            state: Mutex::new(ItemState {
                status: ItemStatus::Pending,
                error: None,
                encrypted: false,
            }),
        }
    }

    /// Attach the expected content checksum.
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Normalized relative path (stable identity within a batch).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Opaque remote revision tag.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Expected content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Remote modification time (unix seconds).
    pub fn modtime(&self) -> i64 {
        self.modtime
    }

    /// Expected content checksum, if the server advertised one.
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    /// Current status.
    pub fn status(&self) -> ItemStatus {
        self.state().status
    }

    /// Recorded failure, if the item ended in Error or Aborted.
    pub fn error(&self) -> Option<SyncError> {
        self.state().error.clone()
    }

    /// Whether the owning folder was determined to be end-to-end encrypted.
    pub fn encrypted(&self) -> bool {
        self.state().encrypted
    }

    pub(crate) fn set_status(&self, status: ItemStatus) {
        self.state().status = status;
    }

    pub(crate) fn set_error(&self, status: ItemStatus, error: SyncError) {
        let mut state = self.state();
        state.status = status;
        state.error = Some(error);
    }

    pub(crate) fn set_encrypted(&self, encrypted: bool) {
        self.state().encrypted = encrypted;
    }

    fn state(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Event emitted during a propagation pass
///
/// Consumers subscribe via [`crate::propagator::PropagationContext::subscribe`];
/// the engine never blocks on slow subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item was dispatched (encryption check started)
    ItemStarted {
        /// Item path
        path: String,
    },

    /// An item reached a terminal status
    ItemFinished {
        /// Item path
        path: String,
        /// Terminal status (Success, Error or Aborted)
        status: ItemStatus,
    },

    /// A bulk download job reported completion; fires exactly once per job
    BatchFinished {
        /// Aggregate status per the any-failure-is-Error rule
        status: AggregateStatus,
        /// Number of items that ended in Error or Aborted
        failed: usize,
        /// Number of items ever enqueued into the job
        total: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_pending_and_plain() {
        let item = SyncItem::new("docs/a.txt", "etag-1", 42, 1_700_000_000);
        assert_eq!(item.status(), ItemStatus::Pending);
        assert!(item.error().is_none());
        assert!(!item.encrypted());
        assert!(!item.status().is_terminal());
    }

    #[test]
    fn set_error_records_status_and_detail() {
        let item = SyncItem::new("docs/a.txt", "etag-1", 42, 1_700_000_000);
        item.set_error(ItemStatus::Error, SyncError::network("connection reset"));

        assert_eq!(item.status(), ItemStatus::Error);
        assert!(item.status().is_terminal());
        let error = item.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Network);
        assert_eq!(error.message, "connection reset");
    }

    #[test]
    fn sync_error_display_includes_kind() {
        let error = SyncError::protocol("item missing from bulk response");
        assert_eq!(
            error.to_string(),
            "protocol error: item missing from bulk response"
        );
    }
}
