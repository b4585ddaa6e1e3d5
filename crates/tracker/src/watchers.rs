//! Watcher registry and status fan-out.
//!
//! The registry lives inside the tracker's locked state.  Updating it never
//! calls a watcher directly: registrations that become fully resolved are
//! removed and handed back as [`ResolvedWatch`]es, which the tracker delivers
//! once it has dropped its lock.

use std::{collections::HashMap, fmt, sync::Arc};

use batchtrack_identifiers::{all_resolved, BatchId, BatchStatus, BatchStatuses};
use tracing::*;

use crate::{metrics, observer::BatchFinishWatcher};

/// Handle identifying a watch registration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchId(u64);

impl WatchId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

struct Registration {
    watcher: Arc<dyn BatchFinishWatcher>,
    statuses: BatchStatuses,
}

/// A registration whose batches have all left PENDING, ready to be told.
pub(crate) struct ResolvedWatch {
    id: WatchId,
    watcher: Arc<dyn BatchFinishWatcher>,
    statuses: BatchStatuses,
}

impl ResolvedWatch {
    pub(crate) fn new(
        id: WatchId,
        watcher: Arc<dyn BatchFinishWatcher>,
        statuses: BatchStatuses,
    ) -> Self {
        Self {
            id,
            watcher,
            statuses,
        }
    }

    /// Invokes the watcher.  Must not be called with the tracker lock held.
    pub(crate) fn deliver(self) {
        debug!(watch_id = %self.id, batches = self.statuses.len(), "batches finished");
        self.watcher.on_batches_finished(self.statuses);
    }
}

impl fmt::Debug for ResolvedWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedWatch")
            .field("id", &self.id)
            .field("statuses", &self.statuses)
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct WatcherRegistry {
    registrations: HashMap<WatchId, Registration>,
    next_id: u64,
}

impl WatcherRegistry {
    pub(crate) fn alloc_id(&mut self) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Stores a snapshot that still has at least one PENDING entry.
    pub(crate) fn register(
        &mut self,
        id: WatchId,
        watcher: Arc<dyn BatchFinishWatcher>,
        statuses: BatchStatuses,
    ) {
        debug_assert!(!all_resolved(&statuses));
        self.registrations
            .insert(id, Registration { watcher, statuses });
        metrics::ACTIVE_WATCHERS.set(self.registrations.len() as i64);
    }

    /// Applies a status transition to every registration tracking `batch_id`.
    ///
    /// Entries only ever move away from PENDING; a PENDING transition leaves
    /// entries that are already resolved alone.  Returns the registrations that
    /// became fully resolved, which are no longer in the registry.
    pub(crate) fn update(&mut self, batch_id: &BatchId, status: BatchStatus) -> Vec<ResolvedWatch> {
        let mut finished = Vec::new();

        for (id, reg) in self.registrations.iter_mut() {
            let Some(cur) = reg.statuses.get_mut(batch_id) else {
                continue;
            };

            if status.is_pending() && !cur.is_pending() {
                continue;
            }

            *cur = status;
            if all_resolved(&reg.statuses) {
                finished.push(*id);
            }
        }

        if finished.is_empty() {
            return Vec::new();
        }

        let resolved: Vec<_> = finished
            .into_iter()
            .filter_map(|id| {
                self.registrations
                    .remove(&id)
                    .map(|reg| ResolvedWatch::new(id, reg.watcher, reg.statuses))
            })
            .collect();

        trace!(%batch_id, %status, resolved = resolved.len(), "watchers updated");
        metrics::WATCHES_TOTAL
            .with_label_values(&["resolved"])
            .inc_by(resolved.len() as u64);
        metrics::ACTIVE_WATCHERS.set(self.registrations.len() as i64);

        resolved
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.len()
    }
}

impl fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("registrations", &self.registrations.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
