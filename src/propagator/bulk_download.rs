//! Bulk download job: one directory's pending downloads, batched
//!
//! Pulls queued items up to the in-flight cap, resolves each item's folder
//! encryption status, combines the resulting non-encrypted items into bulk
//! requests to the transfer delegate, and finalizes every item independently
//! as its completion arrives. One bad file never aborts the rest of the
//! batch, and the terminal done signal fires exactly once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transfer::{DownloadRequest, TransferCompletions, TransferOutcome, TransferSuccess};
use crate::types::{AggregateStatus, ErrorKind, Event, ItemStatus, SyncError, SyncItem};

use super::context::PropagationContext;
use super::{JobParallelism, JobState, PropagationJob};

/// Result of the asynchronous folder-encryption lookup for one item.
struct EncryptionChecked {
    path: String,
    encrypted: std::result::Result<bool, SyncError>,
}

/// One completion callback to apply on the job's controlling task.
enum JobEvent {
    Checked(EncryptionChecked),
    Outcome(TransferOutcome),
    Cancelled,
}

/// Propagation job executing a directory's pending downloads in bulk.
pub struct BulkDownloadJob {
    ctx: Arc<PropagationContext>,
    state: JobState,
    /// FIFO of items not yet dispatched; insertion order is dispatch priority
    queued: VecDeque<Arc<SyncItem>>,
    /// Items dispatched to the encryption check, a bulk request, or the
    /// decrypt path, keyed by item identity
    in_flight: HashMap<String, Arc<SyncItem>>,
    /// Encryption checks still outstanding for the current wave
    pending_checks: usize,
    /// Non-encrypted items waiting to be combined into the next bulk request.
    /// These remain members of `in_flight`.
    bulk_ready: Vec<Arc<SyncItem>>,
    total: usize,
    failed: usize,
    cancel_handled: bool,
    aggregate: Option<AggregateStatus>,
    checks_tx: mpsc::UnboundedSender<EncryptionChecked>,
    checks_rx: mpsc::UnboundedReceiver<EncryptionChecked>,
    outcomes_tx: mpsc::UnboundedSender<TransferOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<TransferOutcome>,
}

impl BulkDownloadJob {
    /// Create a job for one directory, seeded with its initial items.
    ///
    /// More items may arrive via [`add_download_item`](Self::add_download_item)
    /// until the job reports Finished.
    pub fn new(ctx: Arc<PropagationContext>, items: Vec<Arc<SyncItem>>) -> Result<Self> {
        let (checks_tx, checks_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let mut job = Self {
            ctx,
            state: JobState::NotStarted,
            queued: VecDeque::new(),
            in_flight: HashMap::new(),
            pending_checks: 0,
            bulk_ready: Vec::new(),
            total: 0,
            failed: 0,
            cancel_handled: false,
            aggregate: None,
            checks_tx,
            checks_rx,
            outcomes_tx,
            outcomes_rx,
        };
        for item in items {
            job.add_download_item(item)?;
        }
        Ok(job)
    }

    /// Enqueue one item for download.
    ///
    /// Rejects an item whose path is already queued or in flight (duplicate
    /// enqueue is a caller error), and any item added after the job has
    /// reported Finished.
    pub fn add_download_item(&mut self, item: Arc<SyncItem>) -> Result<()> {
        if self.state == JobState::Finished {
            return Err(Error::JobFinished(item.path().to_string()));
        }
        let path = item.path();
        if self.in_flight.contains_key(path) || self.queued.iter().any(|q| q.path() == path) {
            return Err(Error::DuplicateItem(path.to_string()));
        }
        self.total += 1;
        // After cancellation handling the queue is never drained again, so a
        // straggler is aborted on the spot instead of being stranded in it.
        if self.cancel_handled {
            item.set_error(
                ItemStatus::Aborted,
                SyncError::aborted("sync cancelled before dispatch"),
            );
            self.failed += 1;
            self.ctx.emit(Event::ItemFinished {
                path: item.path().to_string(),
                status: ItemStatus::Aborted,
            });
            return Ok(());
        }
        self.queued.push_back(item);
        Ok(())
    }

    /// Dispatch one item: resolve its folder's encryption status, then route.
    fn start(&mut self, item: Arc<SyncItem>) {
        item.set_status(ItemStatus::InProgress);
        self.ctx.emit(Event::ItemStarted {
            path: item.path().to_string(),
        });
        self.pending_checks += 1;
        let router = Arc::clone(&self.ctx.encryption);
        let tx = self.checks_tx.clone();
        let path = item.path().to_string();
        tokio::spawn(async move {
            let encrypted = router.is_folder_encrypted(&path).await;
            let _ = tx.send(EncryptionChecked { path, encrypted });
        });
    }

    fn start_after_is_encrypted_is_checked(&mut self, checked: EncryptionChecked) {
        self.pending_checks = self.pending_checks.saturating_sub(1);
        let Some(item) = self.in_flight.get(&checked.path).map(Arc::clone) else {
            tracing::warn!(path = %checked.path, "encryption check completed for unknown item");
            self.flush_bulk_if_ready();
            return;
        };
        match checked.encrypted {
            Err(error) => {
                // A failed lookup is item-local, like any transfer failure
                self.abort_with_error(&checked.path, ItemStatus::Error, error);
            }
            Ok(true) => {
                item.set_encrypted(true);
                self.dispatch_encrypted(item);
            }
            Ok(false) => {
                self.bulk_ready.push(item);
            }
        }
        self.flush_bulk_if_ready();
    }

    /// Combine checked, non-encrypted items into bulk requests.
    ///
    /// A full batch goes out immediately; a partial one waits until the
    /// current wave of encryption checks has resolved, so concurrently
    /// dispatched items share one physical request.
    fn flush_bulk_if_ready(&mut self) {
        let limit = self.ctx.config.bulk_batch_limit.max(1);
        while self.bulk_ready.len() >= limit {
            let batch: Vec<_> = self.bulk_ready.drain(..limit).collect();
            self.dispatch_bulk(batch);
        }
        if self.pending_checks == 0 && !self.bulk_ready.is_empty() {
            let batch: Vec<_> = self.bulk_ready.drain(..).collect();
            self.dispatch_bulk(batch);
        }
    }

    fn dispatch_bulk(&self, items: Vec<Arc<SyncItem>>) {
        let requests: Vec<DownloadRequest> =
            items.iter().map(|item| self.request_for(item)).collect();
        tracing::debug!(items = requests.len(), "issuing bulk download request");
        let delegate = Arc::clone(&self.ctx.delegate);
        let completions = TransferCompletions::new(self.outcomes_tx.clone());
        tokio::spawn(async move {
            delegate.fetch(requests, completions).await;
        });
    }

    /// Encrypted items never join a bulk request; each one goes through the
    /// decrypt path on its own.
    fn dispatch_encrypted(&self, item: Arc<SyncItem>) {
        let request = self.request_for(&item);
        let router = Arc::clone(&self.ctx.encryption);
        let tx = self.outcomes_tx.clone();
        let path = item.path().to_string();
        tokio::spawn(async move {
            let result = router.download_encrypted(request).await;
            let _ = tx.send(TransferOutcome { path, result });
        });
    }

    fn request_for(&self, item: &SyncItem) -> DownloadRequest {
        DownloadRequest {
            path: item.path().to_string(),
            size: item.size(),
            etag: item.etag().to_string(),
            checksum: item.checksum().cloned(),
            destination: self.ctx.store.staging_path(item.path()),
        }
    }

    async fn on_transfer_outcome(&mut self, outcome: TransferOutcome) {
        match outcome.result {
            Ok(success) => self.finalize_one_file(outcome.path, success).await,
            Err(error) => {
                let status = if error.kind == ErrorKind::Aborted {
                    ItemStatus::Aborted
                } else {
                    ItemStatus::Error
                };
                self.abort_with_error(&outcome.path, status, error);
            }
        }
    }

    /// Commit a successfully transferred item's metadata and retire it.
    async fn finalize_one_file(&mut self, path: String, success: TransferSuccess) {
        let Some(item) = self.in_flight.get(&path).map(Arc::clone) else {
            // Second line of defense: the delegate contract already promises
            // exactly one terminal callback per item
            tracing::warn!(path = %path, "duplicate or stray completion, dropping");
            return;
        };
        tracing::trace!(path = %path, bytes = success.bytes, "transfer complete, committing metadata");
        match self.ctx.store.finalize(&item).await {
            Ok(()) => item.set_status(ItemStatus::Success),
            Err(error) => {
                // Metadata inconsistency is not retried by this job
                tracing::warn!(path = %path, error = %error, "metadata commit failed");
                item.set_error(ItemStatus::Error, error);
                self.failed += 1;
            }
        }
        self.in_flight.remove(&path);
        self.ctx.emit(Event::ItemFinished {
            path,
            status: item.status(),
        });
        self.check_propagation_is_done();
    }

    /// Record one item's failure and retire it. Sibling items, queued or in
    /// flight, are unaffected.
    fn abort_with_error(&mut self, path: &str, status: ItemStatus, error: SyncError) {
        let Some(item) = self.in_flight.remove(path) else {
            tracing::warn!(path = %path, "terminal callback for item not in flight, dropping");
            return;
        };
        self.bulk_ready.retain(|ready| ready.path() != path);
        tracing::warn!(path = %path, status = ?status, error = %error, "download item failed");
        item.set_error(status, error);
        self.failed += 1;
        self.ctx.emit(Event::ItemFinished {
            path: path.to_string(),
            status,
        });
        self.check_propagation_is_done();
    }

    /// Emit the terminal done signal once both queues are empty.
    ///
    /// Idempotent: completion callbacks arriving in quick succession can all
    /// call this safely.
    fn check_propagation_is_done(&mut self) {
        if self.state == JobState::Finished {
            return;
        }
        if !self.queued.is_empty() || !self.in_flight.is_empty() {
            return;
        }
        let status = if self.cancel_handled {
            AggregateStatus::Aborted
        } else if self.failed > 0 {
            AggregateStatus::Error
        } else {
            AggregateStatus::Success
        };
        self.aggregate = Some(status);
        self.state = JobState::Finished;
        tracing::info!(
            status = ?status,
            total = self.total,
            failed = self.failed,
            "bulk download job finished"
        );
        self.ctx.emit(Event::BatchFinished {
            status,
            failed: self.failed,
            total: self.total,
        });
    }

    /// Batch-level cancellation: stop dispatching, mark still-queued items
    /// Aborted, let in-flight items finish normally.
    fn handle_cancelled(&mut self) {
        self.cancel_handled = true;
        while let Some(item) = self.queued.pop_front() {
            item.set_error(
                ItemStatus::Aborted,
                SyncError::aborted("sync cancelled before dispatch"),
            );
            self.failed += 1;
            self.ctx.emit(Event::ItemFinished {
                path: item.path().to_string(),
                status: ItemStatus::Aborted,
            });
        }
        tracing::info!(in_flight = self.in_flight.len(), "batch cancelled, draining in-flight items");
        self.check_propagation_is_done();
    }
}

#[async_trait]
impl PropagationJob for BulkDownloadJob {
    fn schedule_self_or_child(&mut self) -> bool {
        if self.state == JobState::Finished {
            return false;
        }
        if self.ctx.cancelled() && !self.cancel_handled {
            self.handle_cancelled();
            return false;
        }
        if self.cancel_handled {
            return false;
        }
        let cap = self.ctx.config.max_in_flight.max(1);
        let mut dispatched = false;
        while self.in_flight.len() < cap {
            let Some(item) = self.queued.pop_front() else {
                break;
            };
            self.in_flight
                .insert(item.path().to_string(), Arc::clone(&item));
            self.start(item);
            dispatched = true;
        }
        if dispatched {
            self.state = JobState::Running;
            return true;
        }
        if self.queued.is_empty() && self.in_flight.is_empty() {
            self.check_propagation_is_done();
        }
        false
    }

    fn parallelism(&self) -> JobParallelism {
        JobParallelism::FullParallelism
    }

    fn state(&self) -> JobState {
        self.state
    }

    fn aggregate_status(&self) -> Option<AggregateStatus> {
        self.aggregate
    }

    async fn process_next_event(&mut self) {
        if self.state != JobState::Running {
            return;
        }
        let event = {
            let cancel = self.ctx.cancellation_token();
            tokio::select! {
                _ = cancel.cancelled(), if !self.cancel_handled => JobEvent::Cancelled,
                Some(checked) = self.checks_rx.recv() => JobEvent::Checked(checked),
                Some(outcome) = self.outcomes_rx.recv() => JobEvent::Outcome(outcome),
            }
        };
        match event {
            JobEvent::Cancelled => self.handle_cancelled(),
            JobEvent::Checked(checked) => self.start_after_is_encrypted_is_checked(checked),
            JobEvent::Outcome(outcome) => self.on_transfer_outcome(outcome).await,
        }
    }
}

#[cfg(test)]
impl BulkDownloadJob {
    pub(crate) fn queued_paths(&self) -> Vec<String> {
        self.queued.iter().map(|i| i.path().to_string()).collect()
    }

    pub(crate) fn in_flight_paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.in_flight.keys().cloned().collect();
        paths.sort();
        paths
    }
}
