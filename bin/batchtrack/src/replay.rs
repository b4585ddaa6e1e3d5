//! Replays script ops against a tracker backed by an in-memory ledger.

use std::{collections::BTreeMap, sync::Arc};

use batchtrack_config::TrackerConfig;
use batchtrack_tracker::{
    BatchFinishWatcher, BatchId, BatchStatus, BatchStatuses, BatchTracker, InMemoryLedger,
    InvalidTransactionObserver, InvalidTxnInfo, LedgerUpdateObserver, PendingBatch,
    PendingBatchObserver,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::*;

use crate::{
    errors::DriverError,
    script::{NumberedOp, ScriptOp},
};

/// Statuses sorted by batch ID so output is stable.
type StatusMap = BTreeMap<BatchId, BatchStatus>;

/// One line of driver output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum Output {
    Status {
        line: usize,
        statuses: StatusMap,
    },
    InvalidInfo {
        line: usize,
        batch_id: BatchId,
        #[serde(skip_serializing_if = "Option::is_none")]
        info: Option<InvalidTxnInfo>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    WatchRegistered {
        line: usize,
        watch_id: u64,
    },
    /// `line` is the line of the watch op, not the one that resolved it.
    WatchFinished {
        line: usize,
        statuses: StatusMap,
    },
}

fn sorted(statuses: BatchStatuses) -> StatusMap {
    statuses.into_iter().collect()
}

/// Queues its result for the driver to print after the current op.
#[derive(Debug)]
struct QueueingWatcher {
    line: usize,
    outbox: Arc<Mutex<Vec<Output>>>,
}

impl BatchFinishWatcher for QueueingWatcher {
    fn on_batches_finished(&self, statuses: BatchStatuses) {
        self.outbox.lock().push(Output::WatchFinished {
            line: self.line,
            statuses: sorted(statuses),
        });
    }
}

pub(crate) type DriverTracker = BatchTracker<Arc<InMemoryLedger>>;

#[derive(Debug)]
pub(crate) struct Replayer {
    ledger: Arc<InMemoryLedger>,
    tracker: DriverTracker,
    outbox: Arc<Mutex<Vec<Output>>>,
}

impl Replayer {
    pub(crate) fn new(config: &TrackerConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let tracker = BatchTracker::from_config(ledger.clone(), config);
        Self {
            ledger,
            tracker,
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn tracker(&self) -> &DriverTracker {
        &self.tracker
    }

    /// Applies one op, returning what it printed followed by any watches it
    /// resolved.
    pub(crate) fn apply(&self, (line, op): NumberedOp) -> Result<Vec<Output>, DriverError> {
        trace!(%line, ?op, "applying script op");
        let mut out = Vec::new();

        match op {
            ScriptOp::Admit {
                batch_id,
                transaction_ids,
            } => {
                self.tracker
                    .on_batch_admitted(&PendingBatch::new(batch_id, transaction_ids));
            }

            ScriptOp::Reject {
                transaction_id,
                message,
                extended_data,
            } => {
                let extended_data = extended_data
                    .map(hex::decode)
                    .transpose()
                    .map_err(|source| DriverError::MalformedHex { line, source })?;
                self.tracker
                    .on_transaction_rejected(&transaction_id, message, extended_data);
            }

            ScriptOp::Commit { batch_ids } => {
                self.ledger.commit_batches(batch_ids);
                self.tracker.on_ledger_advanced();
            }

            ScriptOp::Status { batch_ids } => {
                let statuses = sorted(self.tracker.get_statuses(&batch_ids));
                out.push(Output::Status { line, statuses });
            }

            ScriptOp::InvalidInfo { batch_id } => {
                let (info, error) = match self.tracker.get_invalid_txn_info(&batch_id) {
                    Ok(info) => (Some(info), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                out.push(Output::InvalidInfo {
                    line,
                    batch_id,
                    info,
                    error,
                });
            }

            ScriptOp::Watch { batch_ids } => {
                let watcher = Arc::new(QueueingWatcher {
                    line,
                    outbox: self.outbox.clone(),
                });
                if let Some(id) = self.tracker.watch_statuses(watcher, &batch_ids) {
                    out.push(Output::WatchRegistered {
                        line,
                        watch_id: id.as_u64(),
                    });
                }
            }
        }

        out.extend(self.outbox.lock().drain(..));
        Ok(out)
    }
}
