//! Test utilities for tracker tests.

use batchtrack_identifiers::{BatchId, BatchStatus, BatchStatuses, TransactionId};
use parking_lot::Mutex;

use crate::{observer::BatchFinishWatcher, types::PendingBatch};

/// Watcher that records every call it gets.
#[derive(Debug, Default)]
pub(crate) struct RecordingWatcher {
    calls: Mutex<Vec<BatchStatuses>>,
}

impl RecordingWatcher {
    pub(crate) fn calls(&self) -> Vec<BatchStatuses> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl BatchFinishWatcher for RecordingWatcher {
    fn on_batches_finished(&self, statuses: BatchStatuses) {
        self.calls.lock().push(statuses);
    }
}

/// Creates a pending batch with the given transaction IDs.
pub(crate) fn make_batch(batch_id: &str, txn_ids: &[&str]) -> PendingBatch {
    PendingBatch::new(
        BatchId::new(batch_id),
        txn_ids.iter().map(|t| TransactionId::new(*t)).collect(),
    )
}

/// Builds an expected statuses map.
pub(crate) fn statuses(entries: &[(&str, BatchStatus)]) -> BatchStatuses {
    entries
        .iter()
        .map(|(id, s)| (BatchId::new(*id), *s))
        .collect()
}
