//! Batch and transaction identifiers.
//!
//! Both are the header signatures of the respective objects, carried around as
//! opaque strings.  We never inspect them beyond equality and hashing.

use arbitrary::Arbitrary;
use serde::{Deserialize, Serialize};

/// ID of a batch, its header signature.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Arbitrary, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl_string_id!(BatchId);

/// ID of a transaction, its header signature.
///
/// At submission time a transaction belongs to exactly one batch.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Arbitrary, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl_string_id!(TransactionId);
