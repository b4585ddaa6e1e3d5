//! Batch tracker data types.

use batchtrack_identifiers::{BatchId, TransactionId};
use serde::{Deserialize, Serialize};

/// A batch as handed over by the admission stage: its ID and the IDs of its
/// transactions, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBatch {
    batch_id: BatchId,
    transaction_ids: Vec<TransactionId>,
}

impl PendingBatch {
    pub fn new(batch_id: BatchId, transaction_ids: Vec<TransactionId>) -> Self {
        Self {
            batch_id,
            transaction_ids,
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn transaction_ids(&self) -> &[TransactionId] {
        &self.transaction_ids
    }
}

/// Why a batch was found invalid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidTxnInfo {
    /// The transaction that was rejected.
    pub id: TransactionId,

    /// Error message sent by the transaction processor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Additional error data sent by the transaction processor, if any.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_hex_bytes"
    )]
    pub extended_data: Option<Vec<u8>>,
}

impl InvalidTxnInfo {
    pub fn new(id: TransactionId, message: Option<String>, extended_data: Option<Vec<u8>>) -> Self {
        Self {
            id,
            message,
            extended_data,
        }
    }
}

/// Serde helpers encoding optional bytes as a hex string.
mod opt_hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| hex::decode(s).map_err(de::Error::custom))
            .transpose()
    }
}
