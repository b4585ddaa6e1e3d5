//! Time-bounded record storage.
//!
//! The tracker only needs a small map contract: set a value under a key, read
//! it back until its retention window passes.  [`TimedCache`] is the in-process
//! implementation; expired entries turn invisible to readers immediately and
//! are dropped the next time something is inserted, leaving a key-only
//! tombstone behind for one more retention window.

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    hash::Hash,
    mem,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};

/// Result of looking up a key in an [`ExpiringStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Present and within its retention window.
    Hit(V),

    /// Was stored, but the retention window has passed.  Reported for one
    /// more window after expiry, even once the value is purged.
    Expired,

    /// Never stored, or expired long enough ago to be forgotten.
    Missing,
}

impl<V> Lookup<V> {
    pub fn into_option(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Expired | Lookup::Missing => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Key-value store whose entries expire a fixed duration after being set.
pub trait ExpiringStore<K, V>: Send + Sync {
    /// Sets `value` under `key`, starting (or restarting) its expiry timer.
    fn insert(&self, key: K, value: V);

    /// Looks up `key`.  Never returns an expired value.
    fn lookup(&self, key: &K) -> Lookup<V>;

    fn get(&self, key: &K) -> Option<V> {
        self.lookup(key).into_option()
    }

    fn contains(&self, key: &K) -> bool {
        self.lookup(key).is_hit()
    }
}

struct CachedEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct Entries<K, V> {
    live: HashMap<K, CachedEntry<V>>,

    /// Purged keys, with the instant their entry expired.
    tombstones: HashMap<K, Instant>,
}

/// A map with time-based expiration.
///
/// An entry inserted at `T` is visible for any read strictly before `T + ttl`.
/// From then until `T + 2 * ttl` lookups report [`Lookup::Expired`], even once
/// the value itself has been purged.  After that the key is forgotten.
pub struct TimedCache<K, V, C = SystemClock> {
    ttl: Duration,
    clock: C,
    entries: Mutex<Entries<K, V>>,
}

impl<K, V> TimedCache<K, V> {
    /// Creates a new cache with the specified TTL on the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<K, V, C> TimedCache<K, V, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(Entries {
                live: HashMap::new(),
                tombstones: HashMap::new(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of stored values (including expired ones not yet
    /// purged).  Tombstones aren't counted.
    pub fn len(&self) -> usize {
        self.entries.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().live.is_empty()
    }

    fn is_live(&self, entry: &CachedEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl
    }

    fn is_remembered(&self, expired_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(expired_at) < self.ttl
    }
}

impl<K: Eq + Hash, V, C: Clock> TimedCache<K, V, C> {
    /// Drops expired values, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.sweep(&mut self.entries.lock(), now)
    }

    /// Moves expired values to tombstones and forgets stale tombstones.
    fn sweep(&self, entries: &mut Entries<K, V>, now: Instant) -> usize {
        let mut purged = 0;
        for (key, entry) in mem::take(&mut entries.live) {
            if self.is_live(&entry, now) {
                entries.live.insert(key, entry);
            } else {
                let expired_at = entry.inserted_at.checked_add(self.ttl).unwrap_or(now);
                entries.tombstones.insert(key, expired_at);
                purged += 1;
            }
        }

        entries
            .tombstones
            .retain(|_, expired_at| self.is_remembered(*expired_at, now));
        purged
    }
}

impl<K, V, C> ExpiringStore<K, V> for TimedCache<K, V, C>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
    C: Clock,
{
    fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        // Clean up expired entries while we're here
        self.sweep(&mut entries, now);

        entries.tombstones.remove(&key);
        entries.live.insert(
            key,
            CachedEntry {
                value,
                inserted_at: now,
            },
        );
    }

    fn lookup(&self, key: &K) -> Lookup<V> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        if let Some(e) = entries.live.get(key) {
            if self.is_live(e, now) {
                return Lookup::Hit(e.value.clone());
            }
            return Lookup::Expired;
        }

        match entries.tombstones.get(key) {
            Some(expired_at) if self.is_remembered(*expired_at, now) => Lookup::Expired,
            _ => Lookup::Missing,
        }
    }

    fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .live
            .get(key)
            .is_some_and(|e| self.is_live(e, now))
    }
}

impl<K, V, C: Debug> Debug for TimedCache<K, V, C> {
    #[expect(clippy::absolute_paths, reason = "qualified Result avoids ambiguity")]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedCache")
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .field("len", &self.len())
            .finish()
    }
}
