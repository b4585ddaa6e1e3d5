//! Commit ledger interface.

use std::{collections::HashSet, sync::Arc};

use batchtrack_identifiers::BatchId;
use parking_lot::RwLock;

/// Answers whether a batch has been durably committed.
///
/// The tracker only ever reads from the ledger.  Lookups may be far more
/// expensive than the tracker's own in-memory maps.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait CommitLedger: Send + Sync {
    fn has_batch(&self, batch_id: &BatchId) -> bool;
}

impl<L: CommitLedger + ?Sized> CommitLedger for Arc<L> {
    fn has_batch(&self, batch_id: &BatchId) -> bool {
        (**self).has_batch(batch_id)
    }
}

/// Ledger kept entirely in memory, for tests and the replay driver.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    batches: RwLock<HashSet<BatchId>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a batch as committed.  Returns false if it already was.
    pub fn commit_batch(&self, batch_id: BatchId) -> bool {
        self.batches.write().insert(batch_id)
    }

    pub fn commit_batches(&self, batch_ids: impl IntoIterator<Item = BatchId>) {
        self.batches.write().extend(batch_ids);
    }

    pub fn len(&self) -> usize {
        self.batches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.read().is_empty()
    }
}

impl CommitLedger for InMemoryLedger {
    fn has_batch(&self, batch_id: &BatchId) -> bool {
        self.batches.read().contains(batch_id)
    }
}
