//! Batch status tracking for a transaction-processing node.
//!
//! Answers where a locally submitted batch is (pending, committed, invalid or
//! unknown), remembers why invalid batches failed for a while, and tells
//! watchers once every batch they care about has stopped being pending.

mod clock;
mod errors;
mod ledger;
pub mod metrics;
mod observer;
mod store;
mod tracker;
mod types;
mod watchers;

#[cfg(test)]
mod test_utils;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use errors::{TrackerError, TrackerResult};
#[cfg(any(test, feature = "test-utils"))]
pub use ledger::MockCommitLedger;
pub use ledger::{CommitLedger, InMemoryLedger};
pub use observer::{
    BatchFinishWatcher, ChannelWatcher, InvalidTransactionObserver, LedgerUpdateObserver,
    PendingBatchObserver,
};
pub use store::{ExpiringStore, Lookup, TimedCache};
pub use tracker::{BatchTracker, InvalidCache};
pub use types::{InvalidTxnInfo, PendingBatch};
pub use watchers::WatchId;

// Re-export the identifiers every caller needs.
pub use batchtrack_identifiers::{BatchId, BatchStatus, BatchStatuses, TransactionId};
