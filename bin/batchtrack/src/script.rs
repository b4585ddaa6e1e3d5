//! Script format understood by the replay driver.
//!
//! One JSON object per line, tagged by `op`.  Blank lines and lines starting
//! with `#` are skipped.

use batchtrack_tracker::{BatchId, TransactionId};
use serde::Deserialize;

use crate::errors::DriverError;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum ScriptOp {
    /// A batch was admitted for processing.
    Admit {
        batch_id: BatchId,
        transaction_ids: Vec<TransactionId>,
    },

    /// A transaction was rejected during execution.
    Reject {
        transaction_id: TransactionId,
        #[serde(default)]
        message: Option<String>,
        /// Hex encoded.
        #[serde(default)]
        extended_data: Option<String>,
    },

    /// The batches landed in the ledger, which then advanced.
    Commit { batch_ids: Vec<BatchId> },

    Status { batch_ids: Vec<BatchId> },

    InvalidInfo { batch_id: BatchId },

    Watch { batch_ids: Vec<BatchId> },
}

/// A parsed op along with its 1-based line number.
pub(crate) type NumberedOp = (usize, ScriptOp);

pub(crate) fn parse_script(script: &str) -> Result<Vec<NumberedOp>, DriverError> {
    script
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            serde_json::from_str(text)
                .map(|op| (line, op))
                .map_err(|source| DriverError::MalformedScript { line, source })
        })
        .collect()
}
