//! The per-node client contract.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use multinode_types::{
    BlockHash, BlockHeader, BlockchainInfo, MerkleProof, NetworkInfo, NodeSubmitResponse, OutPoint,
    ScriptCheck, ScriptCheckResult, TxId, TxOut, TxSubmission,
};

use crate::RpcError;

/// Forward-only sequence of raw byte chunks from one node's response body.
///
/// A mid-body failure is yielded as an `Err` item after every chunk that
/// arrived intact; dropping the stream releases the underlying connection.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, RpcError>>;

/// One RPC call against one node.
///
/// Implementations must not retry or time out on their own account beyond
/// connection establishment; the dispatcher bounds every call.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;

    async fn get_network_info(&self) -> Result<NetworkInfo, RpcError>;

    /// Serialized transaction bytes.
    async fn get_raw_transaction(&self, txid: &TxId) -> Result<Vec<u8>, RpcError>;

    async fn send_raw_transactions(
        &self,
        txs: &[TxSubmission],
    ) -> Result<NodeSubmitResponse, RpcError>;

    async fn get_merkle_proof(
        &self,
        txid: &TxId,
        block_hash: &BlockHash,
    ) -> Result<MerkleProof, RpcError>;

    async fn get_block_header(&self, hash: &BlockHash) -> Result<BlockHeader, RpcError>;

    /// One entry per requested outpoint, in request order.
    async fn get_tx_outs(
        &self,
        outpoints: &[OutPoint],
        include_mempool: bool,
    ) -> Result<Vec<TxOut>, RpcError>;

    /// One result per check, in request order. `total_timeout` is passed to
    /// the node as its own verification budget.
    async fn verify_script(
        &self,
        checks: &[ScriptCheck],
        stop_on_first_invalid: bool,
        total_timeout: Duration,
    ) -> Result<Vec<ScriptCheckResult>, RpcError>;

    /// Open the serialized block as a chunk stream.
    ///
    /// Returns [`RpcError::NotFound`] when the node does not have the block.
    async fn get_block_stream(&self, hash: &BlockHash) -> Result<ChunkStream, RpcError>;
}
