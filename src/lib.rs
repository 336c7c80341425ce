//! Bulk file-propagation engine for a two-way sync client
//!
//! Executes the download half of one sync run: a tree of propagation jobs
//! whose leaves batch a directory's pending downloads into combined bulk
//! requests, finalize each file independently (atomic rename, modification
//! time, journal commit), and roll per-item results up into one aggregate
//! status. Items in end-to-end-encrypted folders bypass bulk batching and go
//! through a per-item decrypt path.
//!
//! # Features
//!
//! - **Bulk batching**: dispatched non-encrypted items are combined into
//!   bulk requests of at most `bulk_batch_limit` items
//! - **Failure isolation**: one bad file never aborts its siblings; the
//!   batch finishes and reports which items failed
//! - **Bounded dispatch**: at most `max_in_flight` items outstanding per job
//! - **Ordered job trees**: directory jobs run children in order, with
//!   optional exclusive (wait-for-finished) children
//! - **Pluggable transport**: [`TransferDelegate`] abstracts the wire;
//!   an HTTP implementation is included
//! - **Durable finalize**: staged content is renamed into place before any
//!   metadata is committed to the SQLite sync journal
//!
//! # Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sync_propagator::{
//!     drive, BulkDownloadJob, FsLocalStore, HttpTransferDelegate, PlaintextRouter,
//!     PropagationContext, PropagatorConfig, SyncItem,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PropagatorConfig::default();
//! config.validate()?;
//!
//! let store = Arc::new(FsLocalStore::from_config(&config).await?);
//! let delegate = Arc::new(HttpTransferDelegate::new(
//!     "https://server.example/files/".parse()?,
//! ));
//! let ctx = Arc::new(PropagationContext::new(
//!     config,
//!     delegate,
//!     Arc::new(PlaintextRouter),
//!     store,
//! ));
//!
//! let items = vec![Arc::new(SyncItem::new(
//!     "docs/report.txt",
//!     "etag-1",
//!     1024,
//!     1_700_000_000,
//! ))];
//! let mut job = BulkDownloadJob::new(Arc::clone(&ctx), items)?;
//! let status = drive(&mut job).await;
//! println!("batch finished: {status:?}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod checksum;
pub mod config;
pub mod encryption;
pub mod error;
pub mod journal;
pub mod propagator;
pub mod store;
pub mod transfer;
pub mod types;

pub use checksum::{Checksum, ChecksumAlgo};
pub use config::PropagatorConfig;
pub use encryption::{EncryptionRouter, PlaintextRouter};
pub use error::{Error, Result};
pub use journal::{JournalEntry, MetadataJournal};
pub use propagator::{
    drive, BulkDownloadJob, DirectoryJob, JobParallelism, JobState, PropagationContext,
    PropagationJob,
};
pub use store::{FsLocalStore, LocalStore};
pub use transfer::{
    DownloadRequest, HttpTransferDelegate, TransferCompletions, TransferDelegate, TransferOutcome,
    TransferSuccess,
};
pub use types::{AggregateStatus, ErrorKind, Event, ItemStatus, SyncError, SyncItem};
