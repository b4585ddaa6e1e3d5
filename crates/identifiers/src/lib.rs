//! Identifier and status types shared by the batch tracker and its clients.

#[macro_use]
mod macros;

mod batch;
mod status;

pub use batch::{BatchId, TransactionId};
pub use status::{all_resolved, BatchStatus, BatchStatuses, RawBatchStatus};
