//! HTTP JSON-RPC client for one bitcoind-compatible node.
//!
//! JSON-RPC calls go to `http://host:port/` with basic auth. Blocks are
//! streamed from the REST interface (`/rest/block/<hash>.bin`) chunk by chunk
//! so a full block is never buffered in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use multinode_types::{
    BlockHash, BlockHeader, BlockchainInfo, MerkleProof, NetworkInfo, NodeEndpoint,
    NodeSubmitResponse, OutPoint, ScriptCheck, ScriptCheckResult, TxId, TxOut, TxSubmission,
};

use crate::client::{ChunkStream, NodeRpc};
use crate::wire::{
    OutPointParam, RpcRequest, RpcResponse, SendRawTxParam, TxOutsResult, VerifyScriptParam,
    timeout_millis,
};
use crate::RpcError;

/// Serializes as an empty JSON array.
const NO_PARAMS: [u8; 0] = [];

pub struct HttpNodeClient {
    endpoint: NodeEndpoint,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    pub fn new(endpoint: NodeEndpoint) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .connect_timeout(endpoint.timeout)
            .build()
            .map_err(|e| RpcError::Protocol(format!("building HTTP client: {e}")))?;
        Ok(Self {
            endpoint,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.endpoint.host, self.endpoint.port)
    }

    fn map_transport(&self, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout(self.endpoint.timeout)
        } else if e.is_decode() {
            RpcError::Protocol(e.to_string())
        } else {
            RpcError::Unreachable(format!("{}: {e}", self.endpoint.id()))
        }
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(node = %self.endpoint.id(), method, id, "rpc call");

        let response = self
            .http
            .post(format!("{}/", self.base_url()))
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.password))
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RpcError::Protocol(format!(
                "{}: rejected credentials",
                self.endpoint.id()
            )));
        }

        // bitcoind reports RPC errors with HTTP 500 and a JSON body, so the
        // body is parsed before the status is judged.
        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;
        match serde_json::from_slice::<RpcResponse<R>>(&body) {
            Ok(parsed) => parsed.into_result(),
            Err(e) if status.is_success() => Err(RpcError::Protocol(format!("{method}: {e}"))),
            Err(_) => Err(RpcError::Protocol(format!("{method}: HTTP {status}"))),
        }
    }
}

#[async_trait]
impl NodeRpc for HttpNodeClient {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call("getblockchaininfo", NO_PARAMS).await
    }

    async fn get_network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.call("getnetworkinfo", NO_PARAMS).await
    }

    async fn get_raw_transaction(&self, txid: &TxId) -> Result<Vec<u8>, RpcError> {
        let hex_tx: String = self.call("getrawtransaction", (txid, 0)).await?;
        hex::decode(hex_tx).map_err(|e| RpcError::Protocol(format!("transaction hex: {e}")))
    }

    async fn send_raw_transactions(
        &self,
        txs: &[TxSubmission],
    ) -> Result<NodeSubmitResponse, RpcError> {
        let params: Vec<SendRawTxParam> = txs.iter().map(SendRawTxParam::from).collect();
        self.call("sendrawtransactions", (params,)).await
    }

    async fn get_merkle_proof(
        &self,
        txid: &TxId,
        block_hash: &BlockHash,
    ) -> Result<MerkleProof, RpcError> {
        self.call("getmerkleproof2", (block_hash, txid)).await
    }

    async fn get_block_header(&self, hash: &BlockHash) -> Result<BlockHeader, RpcError> {
        self.call("getblockheader", (hash, true)).await
    }

    async fn get_tx_outs(
        &self,
        outpoints: &[OutPoint],
        include_mempool: bool,
    ) -> Result<Vec<TxOut>, RpcError> {
        let params: Vec<OutPointParam> = outpoints.iter().map(OutPointParam::from).collect();
        let result: TxOutsResult<TxOut> = self
            .call("gettxouts", (params, ["*"], include_mempool))
            .await?;
        if result.tx_outs.len() != outpoints.len() {
            return Err(RpcError::Protocol(format!(
                "gettxouts: asked for {} outputs, got {}",
                outpoints.len(),
                result.tx_outs.len()
            )));
        }
        Ok(result.tx_outs)
    }

    async fn verify_script(
        &self,
        checks: &[ScriptCheck],
        stop_on_first_invalid: bool,
        total_timeout: Duration,
    ) -> Result<Vec<ScriptCheckResult>, RpcError> {
        let params: Vec<VerifyScriptParam> = checks.iter().map(VerifyScriptParam::from).collect();
        let timeout_ms = timeout_millis(total_timeout);
        let results: Vec<ScriptCheckResult> = self
            .call("verifyscript", (params, stop_on_first_invalid, timeout_ms))
            .await?;
        if results.len() != checks.len() {
            return Err(RpcError::Protocol(format!(
                "verifyscript: sent {} checks, got {} results",
                checks.len(),
                results.len()
            )));
        }
        Ok(results)
    }

    async fn get_block_stream(&self, hash: &BlockHash) -> Result<ChunkStream, RpcError> {
        let url = format!("{}/rest/block/{hash}.bin", self.base_url());
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RpcError::NotFound(format!("block {hash}")));
        }
        if !status.is_success() {
            return Err(RpcError::Protocol(format!("block {hash}: HTTP {status}")));
        }

        let node = self.endpoint.id();
        let chunks = stream::unfold(Some(response), move |state| {
            let node = node.clone();
            async move {
                let mut response = state?;
                match response.chunk().await {
                    Ok(Some(chunk)) => Some((Ok(chunk.to_vec()), Some(response))),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::debug!(node = %node, error = %e, "block body interrupted");
                        Some((Err(RpcError::Interrupted(e.to_string())), None))
                    }
                }
            }
        });
        Ok(chunks.boxed())
    }
}
