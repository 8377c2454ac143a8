//! JSON-RPC 1.0 envelopes and method parameters as bitcoind expects them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use multinode_types::{BlockHash, OutPoint, ScriptCheck, TxId, TxSubmission};

use crate::RpcError;

// ── Envelope ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    pub fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "1.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse<R> {
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl<R> RpcResponse<R> {
    pub fn into_result(self) -> Result<R, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::from_node(err.code, err.message));
        }
        self.result
            .ok_or_else(|| RpcError::Protocol("response carries neither result nor error".into()))
    }
}

// ── Transaction ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SendRawTxParam {
    pub hex: String,
    #[serde(rename = "allowhighfees")]
    pub allow_high_fees: bool,
    #[serde(rename = "dontcheckfee")]
    pub dont_check_fee: bool,
}

impl From<&TxSubmission> for SendRawTxParam {
    fn from(tx: &TxSubmission) -> Self {
        Self {
            hex: hex::encode(&tx.raw),
            allow_high_fees: tx.allow_high_fees,
            dont_check_fee: tx.dont_check_fee,
        }
    }
}

// ── Script verification ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct VerifyScriptParam {
    pub tx: String,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    #[serde(rename = "reportflags")]
    pub report_flags: bool,
    #[serde(rename = "prevblockhash", skip_serializing_if = "Option::is_none")]
    pub prev_block_hash: Option<BlockHash>,
}

impl From<&ScriptCheck> for VerifyScriptParam {
    fn from(check: &ScriptCheck) -> Self {
        Self {
            tx: hex::encode(&check.tx),
            n: check.n,
            flags: check.flags,
            report_flags: check.report_flags,
            prev_block_hash: check.prev_block_hash,
        }
    }
}

// ── Tx outputs ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct OutPointParam {
    pub txid: TxId,
    pub n: u32,
}

impl From<&OutPoint> for OutPointParam {
    fn from(op: &OutPoint) -> Self {
        Self {
            txid: op.txid,
            n: op.n,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TxOutsResult<T> {
    #[serde(rename = "txouts")]
    pub tx_outs: Vec<T>,
}

/// Milliseconds for a timeout parameter, saturating at `u64::MAX`.
pub fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
