//! Script verification payloads (`verifyscript`).

use serde::{Deserialize, Serialize};

use crate::{BlockHash, TxId};

/// One (transaction, input) pair to verify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptCheck {
    pub tx: Vec<u8>,
    /// Input index within `tx`.
    pub n: u32,
    pub flags: Option<u32>,
    pub report_flags: bool,
    pub prev_block_hash: Option<BlockHash>,
}

impl ScriptCheck {
    pub fn new(tx: Vec<u8>, n: u32) -> Self {
        Self {
            tx,
            n,
            flags: None,
            report_flags: false,
            prev_block_hash: None,
        }
    }

    pub fn txid(&self) -> TxId {
        TxId::from_raw_tx(&self.tx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptCheckStatus {
    Ok,
    Error,
    Timeout,
    Skipped,
}

/// One node's verdict on one [`ScriptCheck`]; replies are positional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptCheckResult {
    pub result: ScriptCheckStatus,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScriptCheckResult {
    pub fn ok() -> Self {
        Self {
            result: ScriptCheckStatus::Ok,
            description: None,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            result: ScriptCheckStatus::Error,
            description: Some(description.into()),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.result == ScriptCheckStatus::Error
    }
}
