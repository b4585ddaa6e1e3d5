//! Tracks the status of locally submitted batches.
//!
//! Status is ephemeral: nothing here survives a restart, and it should only
//! be relied on for batches submitted through this node.
//!
//! # Locking
//!
//! The pending set and the watcher registry sit behind one mutex.  Watchers
//! are never called with it held: transitions collect the registrations they
//! resolve and deliver them after unlocking, so a watcher can freely call back
//! into the tracker.  The invalid record store has its own lock, which is
//! only ever taken while holding ours, never the other way round.

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Debug, Formatter},
    sync::Arc,
    time::Duration,
};

use batchtrack_config::TrackerConfig;
use batchtrack_identifiers::{all_resolved, BatchId, BatchStatus, BatchStatuses, TransactionId};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::*;

use crate::{
    errors::{TrackerError, TrackerResult},
    ledger::CommitLedger,
    metrics,
    observer::{
        BatchFinishWatcher, ChannelWatcher, InvalidTransactionObserver, LedgerUpdateObserver,
        PendingBatchObserver,
    },
    store::{ExpiringStore, Lookup, TimedCache},
    types::{InvalidTxnInfo, PendingBatch},
    watchers::{ResolvedWatch, WatchId, WatcherRegistry},
};

/// Default store for invalid batch info.
pub type InvalidCache = TimedCache<BatchId, InvalidTxnInfo>;

/// The status changes a batch can go through.  Nothing ever transitions to
/// UNKNOWN; batches only end up there by being forgotten.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Transition {
    Pending,
    Committed,
    Invalid,
}

impl Transition {
    fn status(self) -> BatchStatus {
        match self {
            Transition::Pending => BatchStatus::Pending,
            Transition::Committed => BatchStatus::Committed,
            Transition::Invalid => BatchStatus::Invalid,
        }
    }

    /// Label on `BATCH_TRANSITIONS_TOTAL`.
    fn metric_label(self) -> &'static str {
        match self {
            Transition::Pending => "pending",
            Transition::Committed => "committed",
            Transition::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Batches believed in flight, with their transaction IDs.
    pending: HashMap<BatchId, HashSet<TransactionId>>,

    watchers: WatcherRegistry,
}

impl TrackerState {
    /// Fans a transition out to the watchers.
    fn emit(&mut self, batch_id: &BatchId, transition: Transition) -> Vec<ResolvedWatch> {
        metrics::BATCH_TRANSITIONS_TOTAL
            .with_label_values(&[transition.metric_label()])
            .inc();
        metrics::PENDING_BATCHES.set(self.pending.len() as i64);

        self.watchers.update(batch_id, transition.status())
    }

    fn find_pending_batch_with_txn(&self, txn_id: &TransactionId) -> Option<BatchId> {
        self.pending
            .iter()
            .find(|(_, txn_ids)| txn_ids.contains(txn_id))
            .map(|(batch_id, _)| batch_id.clone())
    }
}

fn deliver_all(resolved: Vec<ResolvedWatch>) {
    for r in resolved {
        r.deliver();
    }
}

/// Tracks batch statuses for this node, letting other components check where a
/// batch is in the validation process or wait for a set of batches to finish.
///
/// Upstream stages drive it through [`LedgerUpdateObserver`],
/// [`InvalidTransactionObserver`] and [`PendingBatchObserver`].
pub struct BatchTracker<L, S = InvalidCache> {
    ledger: L,
    invalid: S,
    state: Mutex<TrackerState>,
}

impl<L: CommitLedger> BatchTracker<L> {
    /// Creates a tracker that keeps invalid batch info for `invalid_retention`.
    pub fn new(ledger: L, invalid_retention: Duration) -> Self {
        Self::with_store(ledger, TimedCache::new(invalid_retention))
    }

    pub fn from_config(ledger: L, config: &TrackerConfig) -> Self {
        Self::new(ledger, config.invalid_retention())
    }
}

impl<L, S> BatchTracker<L, S>
where
    L: CommitLedger,
    S: ExpiringStore<BatchId, InvalidTxnInfo>,
{
    /// Creates a tracker with a custom store for invalid batch info.
    pub fn with_store(ledger: L, invalid: S) -> Self {
        Self {
            ledger,
            invalid,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the status of a batch.  Unrecognized batches are
    /// [`BatchStatus::Unknown`].
    pub fn get_status(&self, batch_id: &BatchId) -> BatchStatus {
        let state = self.state.lock();
        self.status_locked(&state, batch_id)
    }

    /// Returns the statuses of several batches, all read under one lock.
    pub fn get_statuses(&self, batch_ids: &[BatchId]) -> BatchStatuses {
        let state = self.state.lock();
        batch_ids
            .iter()
            .map(|id| (id.clone(), self.status_locked(&state, id)))
            .collect()
    }

    fn status_locked(&self, state: &TrackerState, batch_id: &BatchId) -> BatchStatus {
        // NOTE: the ledger is queried with the lock held.  That's fine while it's
        // a local store lookup, but if it ever goes remote this has to snapshot
        // and query unlocked like `on_ledger_advanced` does.
        if self.ledger.has_batch(batch_id) {
            BatchStatus::Committed
        } else if self.invalid.contains(batch_id) {
            BatchStatus::Invalid
        } else if state.pending.contains_key(batch_id) {
            BatchStatus::Pending
        } else {
            BatchStatus::Unknown
        }
    }

    /// Fetches the transaction that failed within a batch, along with any error
    /// message or extra data about the failure.
    pub fn get_invalid_txn_info(&self, batch_id: &BatchId) -> TrackerResult<InvalidTxnInfo> {
        match self.invalid.lookup(batch_id) {
            Lookup::Hit(info) => Ok(info),
            Lookup::Expired => Err(TrackerError::InvalidInfoExpired(batch_id.clone())),
            Lookup::Missing => Err(TrackerError::NotInvalid(batch_id.clone())),
        }
    }

    /// Registers `watcher` to be told once none of `batch_ids` is pending.
    ///
    /// If that's already the case the watcher is called before this returns
    /// and `None` is returned.  Otherwise it is called exactly once, later, from
    /// whichever thread drives the last transition.  There is no timeout, that's
    /// up to the caller.
    pub fn watch_statuses(
        &self,
        watcher: Arc<dyn BatchFinishWatcher>,
        batch_ids: &[BatchId],
    ) -> Option<WatchId> {
        let mut state = self.state.lock();
        let statuses: BatchStatuses = batch_ids
            .iter()
            .map(|id| (id.clone(), self.status_locked(&state, id)))
            .collect();
        let id = state.watchers.alloc_id();

        if all_resolved(&statuses) {
            drop(state);
            metrics::WATCHES_TOTAL
                .with_label_values(&["immediate"])
                .inc();
            ResolvedWatch::new(id, watcher, statuses).deliver();
            return None;
        }

        debug!(watch_id = %id, batches = statuses.len(), "registered batch watcher");
        state.watchers.register(id, watcher, statuses);
        metrics::WATCHES_TOTAL
            .with_label_values(&["registered"])
            .inc();
        Some(id)
    }

    /// Like [`Self::watch_statuses`], but hands the final statuses over a
    /// channel.  Wrap the receiver in a timeout to bound the wait.
    pub fn wait_for_batches(&self, batch_ids: &[BatchId]) -> oneshot::Receiver<BatchStatuses> {
        let (watcher, rx) = ChannelWatcher::new();
        self.watch_statuses(Arc::new(watcher), batch_ids);
        rx
    }

    /// Moves batches the ledger reported committed out of the pending set.
    /// Batches no longer pending (invalidated in the meantime) are skipped.
    fn commit_pending(&self, committed: Vec<BatchId>) {
        if committed.is_empty() {
            return;
        }

        let mut resolved = Vec::new();
        {
            let mut state = self.state.lock();
            for batch_id in committed {
                if state.pending.remove(&batch_id).is_none() {
                    continue;
                }
                debug!(%batch_id, "batch committed");
                resolved.extend(state.emit(&batch_id, Transition::Committed));
            }
        }

        deliver_all(resolved);
    }

    /// Returns the number of batches currently pending.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns the number of watchers still waiting.
    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }
}

impl<L, S> LedgerUpdateObserver for BatchTracker<L, S>
where
    L: CommitLedger,
    S: ExpiringStore<BatchId, InvalidTxnInfo>,
{
    /// Removes batches from the pending set if found in the ledger, and notifies
    /// any watchers.
    fn on_ledger_advanced(&self) {
        // The ledger may be slow, so query it against a snapshot with the lock
        // released, then only commit what's still pending when we come back.
        let candidates: Vec<BatchId> = self.state.lock().pending.keys().cloned().collect();
        if candidates.is_empty() {
            return;
        }

        let committed: Vec<BatchId> = candidates
            .into_iter()
            .filter(|id| self.ledger.has_batch(id))
            .collect();
        self.commit_pending(committed);
    }
}

impl<L, S> InvalidTransactionObserver for BatchTracker<L, S>
where
    L: CommitLedger,
    S: ExpiringStore<BatchId, InvalidTxnInfo>,
{
    /// Marks the pending batch containing `txn_id` invalid, remembering why for
    /// the retention window.
    ///
    /// A transaction is assumed to be in at most one pending batch, so this
    /// stops at the first match.  Rejections matching nothing are stale and
    /// ignored.
    fn on_transaction_rejected(
        &self,
        txn_id: &TransactionId,
        message: Option<String>,
        extended_data: Option<Vec<u8>>,
    ) {
        let resolved = {
            let mut state = self.state.lock();
            let Some(batch_id) = state.find_pending_batch_with_txn(txn_id) else {
                trace!(%txn_id, "ignoring rejection for txn not in any pending batch");
                metrics::STALE_REJECTIONS_TOTAL.inc();
                return;
            };

            let info = InvalidTxnInfo::new(txn_id.clone(), message, extended_data);
            self.invalid.insert(batch_id.clone(), info);
            state.pending.remove(&batch_id);

            debug!(%batch_id, %txn_id, "batch invalid");
            state.emit(&batch_id, Transition::Invalid)
        };

        deliver_all(resolved);
    }
}

impl<L, S> PendingBatchObserver for BatchTracker<L, S>
where
    L: CommitLedger,
    S: ExpiringStore<BatchId, InvalidTxnInfo>,
{
    /// Adds a batch to the pending set with its transaction IDs.
    ///
    /// Batches that already left the pending set (committed, or invalid and
    /// still remembered) are not put back.  Once an invalid record expires the
    /// batch is unknown again and can be re-admitted.
    fn on_batch_admitted(&self, batch: &PendingBatch) {
        let batch_id = batch.batch_id();

        if self.ledger.has_batch(batch_id) {
            debug!(%batch_id, "ignoring admission of committed batch");
            metrics::IGNORED_ADMISSIONS_TOTAL.inc();
            return;
        }

        let resolved = {
            let mut state = self.state.lock();
            if self.invalid.contains(batch_id) {
                debug!(%batch_id, "ignoring admission of invalid batch");
                metrics::IGNORED_ADMISSIONS_TOTAL.inc();
                return;
            }

            let txn_ids = batch.transaction_ids().iter().cloned().collect();
            state.pending.insert(batch_id.clone(), txn_ids);

            debug!(%batch_id, txns = batch.transaction_ids().len(), "batch pending");
            state.emit(batch_id, Transition::Pending)
        };

        deliver_all(resolved);

        // A sweep running between the check above and the insert would have
        // missed this batch, so look again now that sweeps can see it.
        if self.ledger.has_batch(batch_id) {
            self.commit_pending(vec![batch_id.clone()]);
        }
    }
}

impl<L, S> Debug for BatchTracker<L, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("BatchTracker");
        if let Some(state) = self.state.try_lock() {
            d.field("pending", &state.pending.len())
                .field("watchers", &state.watchers.len());
        }
        d.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            OnceLock, Weak,
        },
        thread,
    };

    use proptest::prelude::*;

    use super::*;
    use crate::{
        clock::ManualClock,
        ledger::{InMemoryLedger, MockCommitLedger},
        test_utils::{make_batch, statuses, RecordingWatcher},
    };

    const RETENTION: Duration = Duration::from_secs(3600);

    type TestTracker = BatchTracker<Arc<InMemoryLedger>>;

    fn setup() -> (TestTracker, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        (BatchTracker::new(ledger.clone(), RETENTION), ledger)
    }

    fn bid(s: &str) -> BatchId {
        BatchId::new(s)
    }

    fn tid(s: &str) -> TransactionId {
        TransactionId::new(s)
    }

    fn commit(tracker: &TestTracker, ledger: &InMemoryLedger, batch_id: &str) {
        ledger.commit_batch(bid(batch_id));
        tracker.on_ledger_advanced();
    }

    #[test]
    fn test_unknown_batch() {
        let (tracker, _) = setup();
        assert_eq!(tracker.get_status(&bid("nope")), BatchStatus::Unknown);
    }

    #[test]
    fn test_admitted_batch_is_pending() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1", "t2"]));

        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Pending);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn test_ledger_advance_commits() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1", "t2"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t3"]));

        commit(&tracker, &ledger, "b1");

        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Committed);
        assert_eq!(tracker.get_status(&bid("b2")), BatchStatus::Pending);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn test_rejected_batch_is_invalid() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1", "t2"]));

        tracker.on_transaction_rejected(&tid("t1"), Some("bad sig".to_owned()), None);

        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Invalid);
        assert_eq!(
            tracker.get_invalid_txn_info(&bid("b1")).unwrap(),
            InvalidTxnInfo::new(tid("t1"), Some("bad sig".to_owned()), None)
        );
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_rejection_keeps_extended_data() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1", "t2"]));
        tracker.on_transaction_rejected(&tid("t2"), None, Some(vec![1, 2, 3]));

        let info = tracker.get_invalid_txn_info(&bid("b1")).unwrap();
        assert_eq!(info.id, tid("t2"));
        assert_eq!(info.message, None);
        assert_eq!(info.extended_data, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_stale_rejection_ignored() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));

        tracker.on_transaction_rejected(&tid("t9"), Some("whatever".to_owned()), None);

        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Pending);
        assert!(tracker.get_invalid_txn_info(&bid("b1")).is_err());

        // Rejecting again after the batch already went invalid is stale too.
        tracker.on_transaction_rejected(&tid("t1"), Some("first".to_owned()), None);
        tracker.on_transaction_rejected(&tid("t1"), Some("second".to_owned()), None);
        assert_eq!(
            tracker
                .get_invalid_txn_info(&bid("b1"))
                .unwrap()
                .message
                .as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_committed_takes_precedence() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_transaction_rejected(&tid("t1"), None, None);
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Invalid);

        ledger.commit_batch(bid("b1"));
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Committed);

        // Committed in the ledger but not swept yet still reads as committed.
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        ledger.commit_batch(bid("b2"));
        assert_eq!(tracker.get_status(&bid("b2")), BatchStatus::Committed);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn test_readmission_ignored() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_transaction_rejected(&tid("t1"), None, None);
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Invalid);

        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        commit(&tracker, &ledger, "b2");
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_get_statuses() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        tracker.on_batch_admitted(&make_batch("b3", &["t3"]));
        commit(&tracker, &ledger, "b1");
        tracker.on_transaction_rejected(&tid("t2"), None, None);

        let got = tracker.get_statuses(&[bid("b1"), bid("b2"), bid("b3"), bid("b4")]);
        assert_eq!(
            got,
            statuses(&[
                ("b1", BatchStatus::Committed),
                ("b2", BatchStatus::Invalid),
                ("b3", BatchStatus::Pending),
                ("b4", BatchStatus::Unknown),
            ])
        );
    }

    #[test]
    fn test_watch_resolved_immediately() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        commit(&tracker, &ledger, "b1");
        tracker.on_transaction_rejected(&tid("t2"), None, None);

        let watcher = Arc::new(RecordingWatcher::default());
        let id = tracker.watch_statuses(watcher.clone(), &[bid("b1"), bid("b2")]);

        assert!(id.is_none());
        assert_eq!(
            watcher.calls(),
            vec![statuses(&[
                ("b1", BatchStatus::Committed),
                ("b2", BatchStatus::Invalid)
            ])]
        );
        assert_eq!(tracker.watcher_count(), 0);
    }

    #[test]
    fn test_watch_empty_set_resolves_immediately() {
        let (tracker, _) = setup();
        let watcher = Arc::new(RecordingWatcher::default());
        assert!(tracker.watch_statuses(watcher.clone(), &[]).is_none());
        assert_eq!(watcher.calls(), vec![BatchStatuses::new()]);
    }

    #[test]
    fn test_watch_fires_once_on_resolution() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        tracker.on_batch_admitted(&make_batch("b3", &["t3"]));
        commit(&tracker, &ledger, "b2");

        let watcher = Arc::new(RecordingWatcher::default());
        let id = tracker.watch_statuses(watcher.clone(), &[bid("b1"), bid("b2")]);
        assert!(id.is_some());
        assert_eq!(watcher.call_count(), 0);
        assert_eq!(tracker.watcher_count(), 1);

        tracker.on_transaction_rejected(&tid("t1"), None, None);
        assert_eq!(
            watcher.calls(),
            vec![statuses(&[
                ("b1", BatchStatus::Invalid),
                ("b2", BatchStatus::Committed)
            ])]
        );
        assert_eq!(tracker.watcher_count(), 0);

        // Unrelated transition later doesn't call it again.
        commit(&tracker, &ledger, "b3");
        assert_eq!(watcher.call_count(), 1);
    }

    #[test]
    fn test_same_watcher_registered_twice() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));

        let watcher = Arc::new(RecordingWatcher::default());
        let a = tracker.watch_statuses(watcher.clone(), &[bid("b1")]);
        let b = tracker.watch_statuses(watcher.clone(), &[bid("b2")]);
        assert_ne!(a, b);

        tracker.on_transaction_rejected(&tid("t1"), None, None);
        tracker.on_transaction_rejected(&tid("t2"), None, None);
        assert_eq!(
            watcher.calls(),
            vec![
                statuses(&[("b1", BatchStatus::Invalid)]),
                statuses(&[("b2", BatchStatus::Invalid)])
            ]
        );
    }

    #[test]
    fn test_invalid_info_retention_boundary() {
        let clock = ManualClock::new();
        let ledger = Arc::new(InMemoryLedger::new());
        let tracker = BatchTracker::with_store(
            ledger,
            TimedCache::<BatchId, InvalidTxnInfo, _>::with_clock(RETENTION, clock.clone()),
        );
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_transaction_rejected(&tid("t1"), Some("bad sig".to_owned()), None);

        clock.advance(RETENTION - Duration::from_millis(1));
        assert!(tracker.get_invalid_txn_info(&bid("b1")).is_ok());
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Invalid);

        clock.advance(Duration::from_millis(1));
        let err = tracker.get_invalid_txn_info(&bid("b1")).unwrap_err();
        assert_eq!(err, TrackerError::InvalidInfoExpired(bid("b1")));
        assert!(err.is_not_found());

        // Once forgotten the batch is simply unknown.
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Unknown);
    }

    #[test]
    fn test_invalid_info_expired_after_purge() {
        let clock = ManualClock::new();
        let ledger = Arc::new(InMemoryLedger::new());
        let tracker = BatchTracker::with_store(
            ledger,
            TimedCache::<BatchId, InvalidTxnInfo, _>::with_clock(RETENTION, clock.clone()),
        );
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_transaction_rejected(&tid("t1"), None, None);
        clock.advance(RETENTION);

        // An unrelated rejection purges b1's record.
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        tracker.on_transaction_rejected(&tid("t2"), None, None);

        assert_eq!(
            tracker.get_invalid_txn_info(&bid("b1")).unwrap_err(),
            TrackerError::InvalidInfoExpired(bid("b1"))
        );
        assert_eq!(
            tracker.get_invalid_txn_info(&bid("zz")).unwrap_err(),
            TrackerError::NotInvalid(bid("zz"))
        );

        // A full window later b1 is forgotten.
        clock.advance(RETENTION);
        assert_eq!(
            tracker.get_invalid_txn_info(&bid("b1")).unwrap_err(),
            TrackerError::NotInvalid(bid("b1"))
        );
    }

    #[test]
    fn test_readmission_after_invalid_info_expires() {
        let clock = ManualClock::new();
        let ledger = Arc::new(InMemoryLedger::new());
        let tracker = BatchTracker::with_store(
            ledger,
            TimedCache::<BatchId, InvalidTxnInfo, _>::with_clock(RETENTION, clock.clone()),
        );
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_transaction_rejected(&tid("t1"), None, None);

        clock.advance(RETENTION - Duration::from_millis(1));
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        assert_eq!(tracker.pending_count(), 0);

        // Once the record is gone the tracker no longer remembers the batch,
        // so it's taken back in.
        clock.advance(Duration::from_millis(1));
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        assert_eq!(tracker.pending_count(), 1);
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Pending);
    }

    #[test]
    fn test_transition_metrics() {
        for (transition, status, label) in [
            (Transition::Pending, BatchStatus::Pending, "pending"),
            (Transition::Committed, BatchStatus::Committed, "committed"),
            (Transition::Invalid, BatchStatus::Invalid, "invalid"),
        ] {
            assert_eq!(transition.status(), status);
            assert_eq!(transition.metric_label(), label);
        }

        let invalid = || {
            metrics::BATCH_TRANSITIONS_TOTAL
                .with_label_values(&["invalid"])
                .get()
        };
        let before = invalid();
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_transaction_rejected(&tid("t1"), None, None);
        assert!(invalid() > before);
    }

    #[test]
    fn test_invalid_info_never_invalid() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));

        let err = tracker.get_invalid_txn_info(&bid("b1")).unwrap_err();
        assert_eq!(err, TrackerError::NotInvalid(bid("b1")));
        assert!(err.is_not_found());
        assert_eq!(err.batch_id(), &bid("b1"));

        let err = tracker.get_invalid_txn_info(&bid("never-seen")).unwrap_err();
        assert!(matches!(err, TrackerError::NotInvalid(_)));
    }

    #[test]
    fn test_from_config() {
        let config = TrackerConfig {
            invalid_retention_secs: 5,
        };
        let tracker = BatchTracker::from_config(InMemoryLedger::new(), &config);
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Pending);
        assert!(format!("{tracker:?}").contains("pending: 1"));
    }

    #[test]
    fn test_ledger_advance_queries_only_pending() {
        let committed = Arc::new(AtomicBool::new(false));
        let c = committed.clone();

        let mut ledger = MockCommitLedger::new();
        // Twice on admission, once on the sweep.
        ledger
            .expect_has_batch()
            .withf(|id: &BatchId| id.as_str() == "b1")
            .times(3)
            .returning(move |_| c.load(Ordering::SeqCst));
        ledger
            .expect_has_batch()
            .withf(|id: &BatchId| id.as_str() != "b1")
            .never();

        let tracker = BatchTracker::new(ledger, RETENTION);
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));

        committed.store(true, Ordering::SeqCst);
        tracker.on_ledger_advanced();
        assert_eq!(tracker.pending_count(), 0);

        // Nothing pending, nothing to ask.
        tracker.on_ledger_advanced();
    }

    /// Watcher that registers another watch from inside its callback.
    struct RewatchingWatcher {
        tracker: Arc<TestTracker>,
        next: BatchId,
        inner: Arc<RecordingWatcher>,
        seen: Mutex<Vec<BatchStatuses>>,
    }

    impl BatchFinishWatcher for RewatchingWatcher {
        fn on_batches_finished(&self, statuses: BatchStatuses) {
            self.seen.lock().push(statuses);
            self.tracker
                .watch_statuses(self.inner.clone(), &[self.next.clone()]);
        }
    }

    #[test]
    fn test_watcher_can_call_back_into_tracker() {
        let (tracker, ledger) = setup();
        let tracker = Arc::new(tracker);
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));

        let inner = Arc::new(RecordingWatcher::default());
        let watcher = Arc::new(RewatchingWatcher {
            tracker: tracker.clone(),
            next: bid("b2"),
            inner: inner.clone(),
            seen: Mutex::new(Vec::new()),
        });
        tracker.watch_statuses(watcher.clone(), &[bid("b1")]);

        commit(&tracker, &ledger, "b1");
        assert_eq!(watcher.seen.lock().len(), 1);
        assert_eq!(tracker.watcher_count(), 1);
        assert_eq!(inner.call_count(), 0);

        tracker.on_transaction_rejected(&tid("t2"), None, None);
        assert_eq!(
            inner.calls(),
            vec![statuses(&[("b2", BatchStatus::Invalid)])]
        );
    }

    /// Ledger that pokes the tracker every time it's asked something.
    #[derive(Default)]
    struct ReentrantLedger {
        inner: InMemoryLedger,
        tracker: OnceLock<Weak<BatchTracker<Arc<ReentrantLedger>>>>,
        calls: AtomicUsize,
    }

    impl CommitLedger for ReentrantLedger {
        fn has_batch(&self, batch_id: &BatchId) -> bool {
            if let Some(tracker) = self.tracker.get().and_then(Weak::upgrade) {
                let _ = tracker.watcher_count();
                self.calls.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.has_batch(batch_id)
        }
    }

    #[test]
    fn test_ledger_sweep_runs_unlocked() {
        let ledger = Arc::new(ReentrantLedger::default());
        let tracker = Arc::new(BatchTracker::new(ledger.clone(), RETENTION));
        ledger
            .tracker
            .set(Arc::downgrade(&tracker))
            .unwrap_or_else(|_| panic!("tracker already set"));

        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.on_batch_admitted(&make_batch("b2", &["t2"]));
        ledger.inner.commit_batch(bid("b2"));
        tracker.on_ledger_advanced();

        assert_eq!(tracker.pending_count(), 1);
        assert!(ledger.calls.load(Ordering::SeqCst) >= 4);
    }

    /// Ledger that gets the batch committed (and swept) right after answering
    /// the first query, as if a block landed mid-admission.
    #[derive(Default)]
    struct RacingLedger {
        inner: InMemoryLedger,
        tracker: OnceLock<Weak<BatchTracker<Arc<RacingLedger>>>>,
        raced: AtomicBool,
    }

    impl CommitLedger for RacingLedger {
        fn has_batch(&self, batch_id: &BatchId) -> bool {
            let committed = self.inner.has_batch(batch_id);
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.commit_batch(batch_id.clone());
                if let Some(tracker) = self.tracker.get().and_then(Weak::upgrade) {
                    tracker.on_ledger_advanced();
                }
            }
            committed
        }
    }

    #[test]
    fn test_admission_racing_ledger_advance() {
        let ledger = Arc::new(RacingLedger::default());
        let tracker = Arc::new(BatchTracker::new(ledger.clone(), RETENTION));
        ledger
            .tracker
            .set(Arc::downgrade(&tracker))
            .unwrap_or_else(|_| panic!("tracker already set"));

        let watcher = Arc::new(RecordingWatcher::default());
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));
        tracker.watch_statuses(watcher.clone(), &[bid("b1")]);

        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(tracker.get_status(&bid("b1")), BatchStatus::Committed);
        assert_eq!(
            watcher.calls(),
            vec![statuses(&[("b1", BatchStatus::Committed)])]
        );
    }

    #[tokio::test]
    async fn test_wait_for_batches() {
        let (tracker, ledger) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));

        let rx = tracker.wait_for_batches(&[bid("b1")]);
        commit(&tracker, &ledger, "b1");

        let got = rx.await.unwrap();
        assert_eq!(got, statuses(&[("b1", BatchStatus::Committed)]));
    }

    #[tokio::test]
    async fn test_wait_for_batches_caller_timeout() {
        let (tracker, _) = setup();
        tracker.on_batch_admitted(&make_batch("b1", &["t1"]));

        let rx = tracker.wait_for_batches(&[bid("b1")]);
        let res = tokio::time::timeout(Duration::from_millis(20), rx).await;
        assert!(res.is_err());

        // Giving up doesn't break later transitions.
        tracker.on_transaction_rejected(&tid("t1"), None, None);
        assert_eq!(tracker.watcher_count(), 0);
    }

    #[test]
    fn test_concurrent_producers_and_watchers() {
        const N: usize = 64;

        let (tracker, ledger) = setup();
        let batch_ids: Vec<BatchId> = (0..N).map(|i| bid(&format!("b{i}"))).collect();
        for i in 0..N {
            tracker.on_batch_admitted(&make_batch(&format!("b{i}"), &[format!("t{i}").as_str()]));
        }

        let early: Vec<_> = batch_ids
            .chunks(4)
            .map(|ids| {
                let w = Arc::new(RecordingWatcher::default());
                tracker.watch_statuses(w.clone(), ids);
                w
            })
            .collect();

        let late = thread::scope(|s| {
            s.spawn(|| {
                for i in (0..N).step_by(2) {
                    tracker.on_transaction_rejected(&tid(&format!("t{i}")), None, None);
                }
            });
            s.spawn(|| {
                for i in (1..N).step_by(2) {
                    ledger.commit_batch(bid(&format!("b{i}")));
                    tracker.on_ledger_advanced();
                }
            });
            let watchers = s.spawn(|| {
                batch_ids
                    .chunks(3)
                    .map(|ids| {
                        let w = Arc::new(RecordingWatcher::default());
                        tracker.watch_statuses(w.clone(), ids);
                        w
                    })
                    .collect::<Vec<_>>()
            });
            watchers.join().unwrap()
        });

        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(tracker.watcher_count(), 0);
        for w in early.iter().chain(late.iter()) {
            let calls = w.calls();
            assert_eq!(calls.len(), 1);
            assert!(all_resolved(&calls[0]));
        }
        for (i, id) in batch_ids.iter().enumerate() {
            let expected = if i % 2 == 0 {
                BatchStatus::Invalid
            } else {
                BatchStatus::Committed
            };
            assert_eq!(tracker.get_status(id), expected);
        }
    }

    #[derive(Clone, Debug)]
    enum Op {
        Admit(u8),
        Reject(u8, bool),
        Commit(u8),
        Watch(Vec<u8>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::Admit),
            (0u8..6, any::<bool>()).prop_map(|(b, second)| Op::Reject(b, second)),
            (0u8..6).prop_map(Op::Commit),
            prop::collection::vec(0u8..6, 0..4).prop_map(Op::Watch),
        ]
    }

    #[derive(Default)]
    struct Model {
        pending: HashSet<u8>,
        invalid: HashSet<u8>,
        committed: HashSet<u8>,
    }

    impl Model {
        fn status(&self, b: u8) -> BatchStatus {
            if self.committed.contains(&b) {
                BatchStatus::Committed
            } else if self.invalid.contains(&b) {
                BatchStatus::Invalid
            } else if self.pending.contains(&b) {
                BatchStatus::Pending
            } else {
                BatchStatus::Unknown
            }
        }
    }

    fn model_bid(b: u8) -> BatchId {
        bid(&format!("b{b}"))
    }

    fn model_batch(b: u8) -> PendingBatch {
        make_batch(
            &format!("b{b}"),
            &[format!("t{b}a").as_str(), format!("t{b}b").as_str()],
        )
    }

    proptest! {
        #[test]
        fn tracker_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let (tracker, ledger) = setup();
            let mut model = Model::default();
            let mut watches = Vec::new();

            for op in ops {
                match op {
                    Op::Admit(b) => {
                        tracker.on_batch_admitted(&model_batch(b));
                        if !model.committed.contains(&b) && !model.invalid.contains(&b) {
                            model.pending.insert(b);
                        }
                    }
                    Op::Reject(b, second) => {
                        let suffix = if second { "b" } else { "a" };
                        tracker.on_transaction_rejected(&tid(&format!("t{b}{suffix}")), None, None);
                        if model.pending.remove(&b) {
                            model.invalid.insert(b);
                        }
                    }
                    Op::Commit(b) => {
                        commit(&tracker, &ledger, &format!("b{b}"));
                        model.committed.insert(b);
                        let committed = &model.committed;
                        model.pending.retain(|p| !committed.contains(p));
                    }
                    Op::Watch(bs) => {
                        let w = Arc::new(RecordingWatcher::default());
                        let ids: Vec<_> = bs.iter().copied().map(model_bid).collect();
                        tracker.watch_statuses(w.clone(), &ids);
                        watches.push((bs, w));
                    }
                }

                for b in 0..6 {
                    prop_assert_eq!(tracker.get_status(&model_bid(b)), model.status(b));
                }
                prop_assert_eq!(tracker.pending_count(), model.pending.len());
            }

            for (bs, w) in watches {
                let calls = w.calls();
                prop_assert!(calls.len() <= 1);
                if let Some(got) = calls.first() {
                    prop_assert!(all_resolved(got));
                    for b in &bs {
                        prop_assert!(got.contains_key(&model_bid(*b)));
                    }
                } else {
                    prop_assert!(bs.iter().any(|b| model.pending.contains(b)));
                }
            }
        }
    }
}
