//! Transaction submission payloads.

use serde::{Deserialize, Serialize};

use crate::TxId;

/// One transaction to broadcast, with the node-side policy overrides it carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxSubmission {
    pub raw: Vec<u8>,
    pub allow_high_fees: bool,
    pub dont_check_fee: bool,
}

impl TxSubmission {
    pub fn new(raw: Vec<u8>) -> Self {
        Self {
            raw,
            allow_high_fees: false,
            dont_check_fee: false,
        }
    }

    pub fn txid(&self) -> TxId {
        TxId::from_raw_tx(&self.raw)
    }
}

/// A transaction a node refused, as listed in a `sendrawtransactions` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedTx {
    pub txid: TxId,
    #[serde(default)]
    pub reject_code: Option<i32>,
    #[serde(default)]
    pub reject_reason: String,
}

/// One node's reply to a batch submission.
///
/// Nodes only list the transactions that were not freshly accepted; anything
/// submitted but absent from all three lists was accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSubmitResponse {
    /// Already in the node's mempool or chain.
    #[serde(default)]
    pub known: Vec<TxId>,
    /// Accepted, then evicted from the mempool.
    #[serde(default)]
    pub evicted: Vec<TxId>,
    #[serde(default)]
    pub invalid: Vec<RejectedTx>,
}
