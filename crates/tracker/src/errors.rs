//! Batch tracker error types.

use batchtrack_identifiers::BatchId;
use thiserror::Error;

/// Errors returned by batch tracker queries.
///
/// Status queries are total; only invalid-info lookups can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// There is no invalid record for the batch: it was never rejected, or its
    /// record expired more than a full retention window ago.
    #[error("batch {0} not in invalid cache")]
    NotInvalid(BatchId),

    /// The batch was rejected but its invalid record is past its retention
    /// window.  Still reported after the record itself is purged, for one more
    /// window.
    #[error("invalid info for batch {0} expired")]
    InvalidInfoExpired(BatchId),
}

impl TrackerError {
    /// Returns true for every not-found flavour.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TrackerError::NotInvalid(_) | TrackerError::InvalidInfoExpired(_)
        )
    }

    pub fn batch_id(&self) -> &BatchId {
        match self {
            TrackerError::NotInvalid(id) | TrackerError::InvalidInfoExpired(id) => id,
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
