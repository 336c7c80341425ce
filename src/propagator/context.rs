//! Shared context for one propagation pass
//!
//! Bundles the handles every job in a tree needs (config, delegate, router,
//! store, event channel, cancellation), reducing parameter passing between
//! jobs and their spawned sub-tasks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::PropagatorConfig;
use crate::encryption::EncryptionRouter;
use crate::store::LocalStore;
use crate::transfer::TransferDelegate;
use crate::types::Event;

/// Buffered events kept per subscriber before old ones are dropped.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Shared handles for a propagation job tree.
pub struct PropagationContext {
    /// Engine configuration
    pub config: PropagatorConfig,
    /// Transport performing the actual transfers
    pub delegate: Arc<dyn TransferDelegate>,
    /// End-to-end-encryption lookup and decrypt path
    pub encryption: Arc<dyn EncryptionRouter>,
    /// Local filesystem adapter and metadata committer
    pub store: Arc<dyn LocalStore>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl PropagationContext {
    /// Create a context for one propagation pass.
    pub fn new(
        config: PropagatorConfig,
        delegate: Arc<dyn TransferDelegate>,
        encryption: Arc<dyn EncryptionRouter>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        Self {
            config,
            delegate,
            encryption,
            store,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to propagation events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Request batch-level cancellation: jobs stop dispatching queued items
    /// and let in-flight transfers finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observed by jobs for batch-level cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine; events are advisory
        let _ = self.event_tx.send(event);
    }
}
