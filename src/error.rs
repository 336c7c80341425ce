//! Error types for sync-propagator
//!
//! Engine-level failures (contract violations, journal/config problems) live
//! here. Per-item transfer failures are *not* errors in this sense: they are
//! recorded on the item as a [`crate::types::SyncError`] and folded into the
//! batch's aggregate status instead of unwinding the job.

use thiserror::Error;

/// Result type alias for sync-propagator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sync-propagator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_in_flight")
        key: Option<String>,
    },

    /// An item with the same path is already queued or in flight
    #[error("duplicate download item enqueued: {0}")]
    DuplicateItem(String),

    /// An item was added to a job that has already reported completion
    #[error("job already finished, rejecting late item: {0}")]
    JobFinished(String),

    /// A checksum string did not match the `<ALGO>:<hex>` wire form
    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    /// Sync journal (SQLite) operation failed
    #[error("journal error: {0}")]
    Journal(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}
