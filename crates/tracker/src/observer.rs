//! Callback surfaces between the tracker and the rest of the node.
//!
//! Upstream pipeline stages drive the tracker through the producer traits;
//! consumers waiting on batches implement [`BatchFinishWatcher`].

use batchtrack_identifiers::{BatchStatuses, TransactionId};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::types::PendingBatch;

/// Notified by the block store whenever the commit ledger advances.
pub trait LedgerUpdateObserver: Send + Sync {
    fn on_ledger_advanced(&self);
}

/// Notified by the executor whenever a transaction is rejected.
pub trait InvalidTransactionObserver: Send + Sync {
    fn on_transaction_rejected(
        &self,
        txn_id: &TransactionId,
        message: Option<String>,
        extended_data: Option<Vec<u8>>,
    );
}

/// Notified by the journal whenever a batch is admitted for processing.
pub trait PendingBatchObserver: Send + Sync {
    fn on_batch_admitted(&self, batch: &PendingBatch);
}

/// Wants to hear once every batch in a set has stopped being pending.
///
/// Called exactly once per registration, never while the tracker's lock is
/// held, so implementations may call back into the tracker.
pub trait BatchFinishWatcher: Send + Sync {
    fn on_batches_finished(&self, statuses: BatchStatuses);
}

/// Watcher that forwards the final statuses over a oneshot channel.
#[derive(Debug)]
pub struct ChannelWatcher {
    tx: Mutex<Option<oneshot::Sender<BatchStatuses>>>,
}

impl ChannelWatcher {
    pub fn new() -> (Self, oneshot::Receiver<BatchStatuses>) {
        let (tx, rx) = oneshot::channel();
        let watcher = Self {
            tx: Mutex::new(Some(tx)),
        };
        (watcher, rx)
    }
}

impl BatchFinishWatcher for ChannelWatcher {
    fn on_batches_finished(&self, statuses: BatchStatuses) {
        if let Some(tx) = self.tx.lock().take() {
            // Receiver may have given up waiting.
            let _ = tx.send(statuses);
        }
    }
}
