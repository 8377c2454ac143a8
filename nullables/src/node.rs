//! Nullable node — scripted answers instead of a JSON-RPC server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use multinode_rpc::{ChunkStream, NodeRpc, RpcError};
use multinode_types::{
    BlockHash, BlockHeader, BlockchainInfo, ChainWork, MerkleProof, NetworkInfo, NodeEndpoint,
    NodeSubmitResponse, OutPoint, ScriptCheck, ScriptCheckResult, TxId, TxOut, TxSubmission,
};

/// Per-call timeout of endpoints built by [`null_endpoint`].
const NULL_TIMEOUT: Duration = Duration::from_secs(1);

/// Endpoint for the `i`-th nullable node: distinct port, short timeout.
pub fn null_endpoint(i: usize) -> NodeEndpoint {
    NodeEndpoint::new("127.0.0.1", 18_000 + i as u16).with_timeout(NULL_TIMEOUT)
}

enum Behavior {
    Respond,
    Fail(RpcError),
    Hang,
}

enum BlockEnd {
    Complete,
    /// Fail with `Interrupted` once this many bytes were delivered.
    Interrupted(usize),
    /// Stop producing chunks (without ending) once this many bytes were delivered.
    Stall(usize),
}

struct NullBlock {
    bytes: Vec<u8>,
    chunk_size: usize,
    end: BlockEnd,
    /// Pause before each chunk.
    gap: Duration,
}

/// A test node that answers from scripted state.
///
/// Every call bumps [`started_calls`](Self::started_calls), sleeps for the
/// configured delay, and only then bumps
/// [`completed_calls`](Self::completed_calls). A call aborted while
/// sleeping is therefore visible as started but never completed.
pub struct NullNode {
    behavior: Behavior,
    delay: Duration,
    blockchain_info: BlockchainInfo,
    network_info: NetworkInfo,
    raw_txs: HashMap<TxId, Vec<u8>>,
    submit_response: NodeSubmitResponse,
    script_results: Option<Vec<ScriptCheckResult>>,
    merkle_proofs: HashMap<TxId, MerkleProof>,
    headers: HashMap<BlockHash, BlockHeader>,
    tx_outs: Option<Vec<TxOut>>,
    blocks: HashMap<BlockHash, NullBlock>,
    started: AtomicUsize,
    completed: AtomicUsize,
    submissions: Mutex<Vec<Vec<TxSubmission>>>,
}

impl NullNode {
    pub fn new() -> Self {
        Self {
            behavior: Behavior::Respond,
            delay: Duration::ZERO,
            blockchain_info: BlockchainInfo {
                chain: "regtest".into(),
                blocks: 0,
                headers: 0,
                best_block_hash: BlockHash::ZERO,
                chain_work: ChainWork::ZERO,
            },
            network_info: NetworkInfo {
                version: 101_001_600,
                subversion: "/Bitcoin SV:1.0.16/".into(),
                protocol_version: 70_016,
                connections: 8,
            },
            raw_txs: HashMap::new(),
            submit_response: NodeSubmitResponse::default(),
            script_results: None,
            merkle_proofs: HashMap::new(),
            headers: HashMap::new(),
            tx_outs: None,
            blocks: HashMap::new(),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    // ── Behavior ────────────────────────────────────────────────────────

    /// Delay every answer (and every failure) by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every call with `error` (after the delay).
    pub fn failing(mut self, error: RpcError) -> Self {
        self.behavior = Behavior::Fail(error);
        self
    }

    /// Never answer.
    pub fn hanging(mut self) -> Self {
        self.behavior = Behavior::Hang;
        self
    }

    // ── Scripted answers ────────────────────────────────────────────────

    /// Tip at `height` with `work`; the best block hash is derived from the height.
    pub fn with_tip(mut self, height: u64, work: u128) -> Self {
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&height.to_le_bytes());
        self.blockchain_info.blocks = height;
        self.blockchain_info.headers = height;
        self.blockchain_info.best_block_hash = BlockHash::new(hash);
        self.blockchain_info.chain_work = ChainWork::from_u128(work);
        self
    }

    pub fn with_blockchain_info(mut self, info: BlockchainInfo) -> Self {
        self.blockchain_info = info;
        self
    }

    pub fn with_network_info(mut self, info: NetworkInfo) -> Self {
        self.network_info = info;
        self
    }

    pub fn with_raw_transaction(mut self, txid: TxId, raw: Vec<u8>) -> Self {
        self.raw_txs.insert(txid, raw);
        self
    }

    pub fn with_submit_response(mut self, response: NodeSubmitResponse) -> Self {
        self.submit_response = response;
        self
    }

    /// Answer every script verification with `results` verbatim. Without
    /// this, every check is reported ok.
    pub fn with_script_results(mut self, results: Vec<ScriptCheckResult>) -> Self {
        self.script_results = Some(results);
        self
    }

    pub fn with_merkle_proof(mut self, txid: TxId, proof: MerkleProof) -> Self {
        self.merkle_proofs.insert(txid, proof);
        self
    }

    pub fn with_block_header(mut self, header: BlockHeader) -> Self {
        self.headers.insert(header.hash, header);
        self
    }

    /// Answer every output lookup with `outs` verbatim. Without this, every
    /// outpoint is reported missing.
    pub fn with_tx_outs(mut self, outs: Vec<TxOut>) -> Self {
        self.tx_outs = Some(outs);
        self
    }

    /// Serve `bytes` as the block `hash`, in chunks of `chunk_size`.
    pub fn with_block(self, hash: BlockHash, bytes: Vec<u8>, chunk_size: usize) -> Self {
        self.with_null_block(hash, bytes, chunk_size, BlockEnd::Complete)
    }

    /// Serve the first `cut_after` bytes of the block, then fail the body.
    pub fn with_truncated_block(
        self,
        hash: BlockHash,
        bytes: Vec<u8>,
        chunk_size: usize,
        cut_after: usize,
    ) -> Self {
        self.with_null_block(hash, bytes, chunk_size, BlockEnd::Interrupted(cut_after))
    }

    /// Serve the first `stall_after` bytes of the block, then go silent.
    pub fn with_stalled_block(
        self,
        hash: BlockHash,
        bytes: Vec<u8>,
        chunk_size: usize,
        stall_after: usize,
    ) -> Self {
        self.with_null_block(hash, bytes, chunk_size, BlockEnd::Stall(stall_after))
    }

    /// Pause `gap` before each chunk of the block `hash`.
    pub fn with_chunk_gap(mut self, hash: BlockHash, gap: Duration) -> Self {
        if let Some(block) = self.blocks.get_mut(&hash) {
            block.gap = gap;
        }
        self
    }

    fn with_null_block(
        mut self,
        hash: BlockHash,
        bytes: Vec<u8>,
        chunk_size: usize,
        end: BlockEnd,
    ) -> Self {
        self.blocks.insert(
            hash,
            NullBlock {
                bytes,
                chunk_size: chunk_size.max(1),
                end,
                gap: Duration::ZERO,
            },
        );
        self
    }

    // ── Assertions ──────────────────────────────────────────────────────

    /// Calls that reached this node.
    pub fn started_calls(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls that ran to an answer (success or failure).
    pub fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Every batch passed to `send_raw_transactions`, in call order.
    pub fn submissions(&self) -> Vec<Vec<TxSubmission>> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    async fn respond<T>(
        &self,
        answer: impl FnOnce() -> Result<T, RpcError> + Send,
    ) -> Result<T, RpcError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = match &self.behavior {
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Respond => answer(),
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

impl Default for NullNode {
    fn default() -> Self {
        Self::new()
    }
}

fn block_not_found(hash: &BlockHash) -> RpcError {
    RpcError::NotFound(format!("block {hash}"))
}

fn chunk_stream(block: &NullBlock) -> ChunkStream {
    let limit = match block.end {
        BlockEnd::Complete => block.bytes.len(),
        BlockEnd::Interrupted(n) | BlockEnd::Stall(n) => n.min(block.bytes.len()),
    };
    let chunks: Vec<Result<Vec<u8>, RpcError>> = block.bytes[..limit]
        .chunks(block.chunk_size)
        .map(|c| Ok(c.to_vec()))
        .collect();
    let gap = block.gap;
    let body = stream::iter(chunks).then(move |chunk| async move {
        if !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
        chunk
    });
    match block.end {
        BlockEnd::Complete => body.boxed(),
        BlockEnd::Interrupted(_) => body
            .chain(stream::once(async {
                Err(RpcError::Interrupted("connection reset by peer".into()))
            }))
            .boxed(),
        BlockEnd::Stall(_) => body.chain(stream::pending()).boxed(),
    }
}

#[async_trait]
impl NodeRpc for NullNode {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.respond(|| Ok(self.blockchain_info.clone())).await
    }

    async fn get_network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.respond(|| Ok(self.network_info.clone())).await
    }

    async fn get_raw_transaction(&self, txid: &TxId) -> Result<Vec<u8>, RpcError> {
        self.respond(|| {
            self.raw_txs
                .get(txid)
                .cloned()
                .ok_or_else(|| RpcError::NotFound(format!("transaction {txid}")))
        })
        .await
    }

    async fn send_raw_transactions(
        &self,
        txs: &[TxSubmission],
    ) -> Result<NodeSubmitResponse, RpcError> {
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(txs.to_vec());
        }
        self.respond(|| Ok(self.submit_response.clone())).await
    }

    async fn get_merkle_proof(
        &self,
        txid: &TxId,
        _block_hash: &BlockHash,
    ) -> Result<MerkleProof, RpcError> {
        self.respond(|| {
            self.merkle_proofs
                .get(txid)
                .cloned()
                .ok_or_else(|| RpcError::NotFound(format!("merkle proof for {txid}")))
        })
        .await
    }

    async fn get_block_header(&self, hash: &BlockHash) -> Result<BlockHeader, RpcError> {
        self.respond(|| self.headers.get(hash).cloned().ok_or_else(|| block_not_found(hash)))
            .await
    }

    async fn get_tx_outs(
        &self,
        outpoints: &[OutPoint],
        _include_mempool: bool,
    ) -> Result<Vec<TxOut>, RpcError> {
        self.respond(|| {
            Ok(self.tx_outs.clone().unwrap_or_else(|| {
                outpoints
                    .iter()
                    .map(|_| TxOut {
                        error: Some("missing".into()),
                        ..TxOut::default()
                    })
                    .collect()
            }))
        })
        .await
    }

    async fn verify_script(
        &self,
        checks: &[ScriptCheck],
        _stop_on_first_invalid: bool,
        _total_timeout: Duration,
    ) -> Result<Vec<ScriptCheckResult>, RpcError> {
        self.respond(|| {
            Ok(self
                .script_results
                .clone()
                .unwrap_or_else(|| checks.iter().map(|_| ScriptCheckResult::ok()).collect()))
        })
        .await
    }

    async fn get_block_stream(&self, hash: &BlockHash) -> Result<ChunkStream, RpcError> {
        self.respond(|| {
            self.blocks
                .get(hash)
                .map(chunk_stream)
                .ok_or_else(|| block_not_found(hash))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_tip_is_served() {
        let node = NullNode::new().with_tip(42, 7);
        let info = node.get_blockchain_info().await.unwrap();
        assert_eq!(info.blocks, 42);
        assert_eq!(info.chain_work, ChainWork::from_u128(7));
        assert_eq!(node.started_calls(), 1);
        assert_eq!(node.completed_calls(), 1);
    }

    #[tokio::test]
    async fn failing_node_returns_scripted_error() {
        let node = NullNode::new().failing(RpcError::Unreachable("refused".into()));
        assert_eq!(
            node.get_network_info().await.unwrap_err(),
            RpcError::Unreachable("refused".into())
        );
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let node = NullNode::new();
        let err = node.get_raw_transaction(&TxId::new([1; 32])).await.unwrap_err();
        assert!(matches!(err, RpcError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_gap_delays_each_chunk() {
        let hash = BlockHash::new([3; 32]);
        let node = NullNode::new()
            .with_block(hash, vec![0; 8], 4)
            .with_chunk_gap(hash, Duration::from_millis(5));
        let started = tokio::time::Instant::now();
        let chunks: Vec<_> = node.get_block_stream(&hash).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_node_starts_but_never_completes() {
        let node = NullNode::new().hanging();
        let waited =
            tokio::time::timeout(Duration::from_secs(10), node.get_blockchain_info()).await;
        assert!(waited.is_err());
        assert_eq!(node.started_calls(), 1);
        assert_eq!(node.completed_calls(), 0);
    }

    #[tokio::test]
    async fn block_is_served_in_chunks() {
        let hash = BlockHash::new([9; 32]);
        let node = NullNode::new().with_block(hash, (0u8..10).collect(), 4);
        let chunks: Vec<_> = node.get_block_stream(&hash).await.unwrap().collect().await;
        let sizes: Vec<_> = chunks.iter().map(|c| c.as_ref().unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn truncated_block_ends_in_error() {
        let hash = BlockHash::new([9; 32]);
        let node = NullNode::new().with_truncated_block(hash, vec![0; 10], 4, 6);
        let chunks: Vec<_> = node.get_block_stream(&hash).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().unwrap().len(), 4);
        assert_eq!(chunks[1].as_ref().unwrap().len(), 2);
        assert!(matches!(chunks[2], Err(RpcError::Interrupted(_))));
    }

    #[tokio::test]
    async fn submissions_are_recorded() {
        let node = NullNode::new();
        let tx = TxSubmission::new(vec![1, 2, 3]);
        node.send_raw_transactions(&[tx.clone()]).await.unwrap();
        assert_eq!(node.submissions(), vec![vec![tx]]);
    }

    #[test]
    fn null_endpoints_are_distinct() {
        assert_ne!(null_endpoint(0).id(), null_endpoint(1).id());
        assert_eq!(null_endpoint(0).timeout, NULL_TIMEOUT);
    }
}
