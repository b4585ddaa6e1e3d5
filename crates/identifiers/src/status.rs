//! Batch status enumeration.

use std::{collections::HashMap, fmt};

use int_enum::IntEnum;
use serde::{Deserialize, Serialize};

use crate::BatchId;

/// Raw primitive version of a batch status, as exposed to API consumers.
pub type RawBatchStatus = u8;

/// Where a locally submitted batch is in its lifecycle.
///
/// The integer tags are part of the client API and must never be renumbered.
/// Tag 0 is reserved for "unset" and does not correspond to a status.
#[repr(u8)]
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, IntEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// The batch is in the commit ledger.
    Committed = 1,

    /// One of the batch's transactions was rejected.
    Invalid = 2,

    /// The batch was admitted and has not been committed or rejected yet.
    Pending = 3,

    /// Nothing is known about the batch, or its invalid record expired.
    Unknown = 4,
}

impl BatchStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, BatchStatus::Pending)
    }

    /// Returns the stable integer tag.
    pub fn to_raw(self) -> RawBatchStatus {
        self.into()
    }

    /// Parses a stable integer tag, returning `None` for 0 and unassigned tags.
    pub fn from_raw(raw: RawBatchStatus) -> Option<Self> {
        Self::try_from(raw).ok()
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Committed => "COMMITTED",
            BatchStatus::Invalid => "INVALID",
            BatchStatus::Pending => "PENDING",
            BatchStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Statuses of a set of batches, keyed by batch ID.
pub type BatchStatuses = HashMap<BatchId, BatchStatus>;

/// Returns true if none of the statuses is [`BatchStatus::Pending`].
///
/// An empty set is trivially resolved.
pub fn all_resolved(statuses: &BatchStatuses) -> bool {
    statuses.values().all(|s| !s.is_pending())
}
