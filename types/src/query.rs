//! Single-value query results: merkle proofs, tx outputs, network info.

use serde::{Deserialize, Serialize};

use crate::{BlockHash, TxId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub n: u32,
}

/// An unspent output as returned by `gettxouts`.
///
/// `error` is set (e.g. `"missing"`, `"spent"`) when the node could not
/// report the output; the remaining fields are then defaulted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: String,
    #[serde(rename = "scriptPubKeyLen", default)]
    pub script_pub_key_len: u64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(rename = "isStandard", default)]
    pub is_standard: bool,
}

impl TxOut {
    /// Output value in satoshis.
    pub fn value_sats(&self) -> u64 {
        (self.value * 100_000_000.0).round() as u64
    }
}

/// A TSC-style merkle proof (`getmerkleproof2`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub index: u64,
    #[serde(rename = "txOrId")]
    pub tx_or_id: String,
    pub target: BlockHash,
    pub nodes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub version: u64,
    pub subversion: String,
    #[serde(rename = "protocolversion")]
    pub protocol_version: u64,
    pub connections: u32,
}
