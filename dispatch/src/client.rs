//! The caller-facing multi-node client.
//!
//! Every operation is one [`Dispatcher::run`] over the targeted nodes with
//! the matching reducer; the client itself holds no mutable state and is
//! cheap to clone.

use std::sync::Arc;
use std::time::Duration;

use multinode_types::{
    BlockHash, BlockHeader, MerkleProof, NetworkInfo, NodeId, OutPoint, ScriptCheck, TxId, TxOut,
    TxSubmission,
};

use crate::reducer::{
    AllReachable, ConsistentLookup, ConsistentResult, FirstAnswer, ScriptVerification,
    ScriptVerificationReport, SubmissionReducer, SubmissionReport, SubmissionStatus, TipReducer,
    TipSelection,
};
use crate::{
    AggregateError, BlockStream, BlockStreamError, CancelToken, ConfigError, ConfiguredNode,
    DispatchMetrics, DispatchOptions, Dispatcher, MultiClientConfig, NodeEndpointSet, NodeReport,
    TimeoutMode,
};

/// Default budget shared by all nodes for one script verification batch.
pub const DEFAULT_SCRIPT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct MultiNodeClient {
    endpoints: Arc<NodeEndpointSet>,
    /// The nodes operations fan out to; all of `endpoints` unless narrowed.
    targets: Vec<Arc<ConfiguredNode>>,
    dispatcher: Dispatcher,
    options: DispatchOptions,
    script_timeout: Duration,
}

impl MultiNodeClient {
    pub fn new(endpoints: NodeEndpointSet) -> Self {
        let targets = endpoints.all().to_vec();
        Self {
            endpoints: Arc::new(endpoints),
            targets,
            dispatcher: Dispatcher::new(),
            options: DispatchOptions::default(),
            script_timeout: DEFAULT_SCRIPT_VERIFICATION_TIMEOUT,
        }
    }

    /// Build an HTTP-backed client from configuration.
    pub fn from_config(config: &MultiClientConfig) -> Result<Self, ConfigError> {
        let endpoints = NodeEndpointSet::connect_http(config.endpoints()?)?;
        let mut client = Self::new(endpoints).with_script_timeout(config.script_verification_timeout());
        client.options.deadline = config.operation_deadline();
        Ok(client)
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.dispatcher = Dispatcher::with_metrics(metrics);
        self
    }

    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Abort every operation of this client (and its clones) once `token`
    /// is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.options.cancel = Some(token);
        self
    }

    /// Bound every operation to `deadline` overall.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.options.deadline = Some(deadline);
        self
    }

    /// A client that targets only the named nodes, in configuration order.
    pub fn with_nodes(&self, ids: &[NodeId]) -> Result<Self, ConfigError> {
        let mut narrowed = self.clone();
        narrowed.targets = self.endpoints.select(ids)?;
        Ok(narrowed)
    }

    pub fn endpoints(&self) -> &NodeEndpointSet {
        &self.endpoints
    }

    pub fn targets(&self) -> &[Arc<ConfiguredNode>] {
        &self.targets
    }

    // ── Chain tip ───────────────────────────────────────────────────────

    /// The tip with the most work (then greatest height) among responding nodes.
    pub async fn get_best_blockchain_info(&self) -> Result<TipSelection, AggregateError> {
        self.tip(TipReducer::best()).await
    }

    /// The tip with the least work (then lowest height) among responding nodes.
    pub async fn get_worst_blockchain_info(&self) -> Result<TipSelection, AggregateError> {
        self.tip(TipReducer::worst()).await
    }

    async fn tip(&self, reducer: TipReducer) -> Result<TipSelection, AggregateError> {
        self.dispatcher
            .run(
                "getblockchaininfo",
                &self.targets,
                |rpc| async move { rpc.get_blockchain_info().await },
                &reducer,
                &self.options,
            )
            .await
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Fetch a raw transaction from every node and check that they agree.
    pub async fn get_raw_transaction(
        &self,
        txid: TxId,
    ) -> Result<ConsistentResult<Vec<u8>>, AggregateError> {
        let result = self
            .dispatcher
            .run(
                "getrawtransaction",
                &self.targets,
                move |rpc| async move { rpc.get_raw_transaction(&txid).await },
                &ConsistentLookup::new(),
                &self.options,
            )
            .await?;
        if !result.all_successes_identical {
            tracing::warn!(%txid, successes = result.successes, "nodes disagree on transaction bytes");
            self.record_inconsistency();
        }
        Ok(result)
    }

    /// Broadcast a batch to every node and merge the per-node verdicts.
    pub async fn submit_transactions(
        &self,
        txs: Vec<TxSubmission>,
    ) -> Result<SubmissionReport, AggregateError> {
        if txs.is_empty() {
            return Ok(SubmissionReport {
                transactions: Vec::new(),
                failures: Vec::new(),
            });
        }
        let reducer = SubmissionReducer::new(txs.iter().map(TxSubmission::txid).collect());
        let batch: Arc<[TxSubmission]> = txs.into();
        let report = self
            .dispatcher
            .run(
                "sendrawtransactions",
                &self.targets,
                move |rpc| {
                    let batch = Arc::clone(&batch);
                    async move { rpc.send_raw_transactions(&batch).await }
                },
                &reducer,
                &self.options,
            )
            .await?;
        if report
            .transactions
            .iter()
            .any(|t| t.status == SubmissionStatus::Conflicting)
        {
            self.record_inconsistency();
        }
        Ok(report)
    }

    // ── Script verification ─────────────────────────────────────────────

    /// Verify `checks` on every node within the configured shared budget.
    pub async fn verify_scripts(
        &self,
        checks: Vec<ScriptCheck>,
        stop_on_first_invalid: bool,
    ) -> Result<ScriptVerificationReport, AggregateError> {
        self.verify_scripts_within(checks, stop_on_first_invalid, self.script_timeout)
            .await
    }

    /// Verify `checks` on every node, all nodes sharing `total_timeout`.
    ///
    /// With `stop_on_first_invalid`, the first node to report an invalid
    /// input ends the operation and every other call is aborted.
    pub async fn verify_scripts_within(
        &self,
        checks: Vec<ScriptCheck>,
        stop_on_first_invalid: bool,
        total_timeout: Duration,
    ) -> Result<ScriptVerificationReport, AggregateError> {
        let reducer = ScriptVerification::new(
            checks.iter().map(|c| (c.txid(), c.n)).collect(),
            stop_on_first_invalid,
        );
        let checks: Arc<[ScriptCheck]> = checks.into();
        let options = DispatchOptions {
            timeout: TimeoutMode::Shared(total_timeout),
            ..self.options.clone()
        };
        self.dispatcher
            .run(
                "verifyscript",
                &self.targets,
                move |rpc| {
                    let checks = Arc::clone(&checks);
                    async move {
                        rpc.verify_script(&checks, stop_on_first_invalid, total_timeout)
                            .await
                    }
                },
                &reducer,
                &options,
            )
            .await
    }

    // ── Single-value queries ────────────────────────────────────────────

    pub async fn get_merkle_proof(
        &self,
        txid: TxId,
        block_hash: BlockHash,
    ) -> Result<NodeReport<MerkleProof>, AggregateError> {
        self.dispatcher
            .run(
                "getmerkleproof2",
                &self.targets,
                move |rpc| async move { rpc.get_merkle_proof(&txid, &block_hash).await },
                &FirstAnswer::new(),
                &self.options,
            )
            .await
    }

    pub async fn get_block_header(
        &self,
        hash: BlockHash,
    ) -> Result<NodeReport<BlockHeader>, AggregateError> {
        self.dispatcher
            .run(
                "getblockheader",
                &self.targets,
                move |rpc| async move { rpc.get_block_header(&hash).await },
                &FirstAnswer::new(),
                &self.options,
            )
            .await
    }

    pub async fn get_tx_outs(
        &self,
        outpoints: Vec<OutPoint>,
        include_mempool: bool,
    ) -> Result<NodeReport<Vec<TxOut>>, AggregateError> {
        let outpoints: Arc<[OutPoint]> = outpoints.into();
        self.dispatcher
            .run(
                "gettxouts",
                &self.targets,
                move |rpc| {
                    let outpoints = Arc::clone(&outpoints);
                    async move { rpc.get_tx_outs(&outpoints, include_mempool).await }
                },
                &FirstAnswer::new(),
                &self.options,
            )
            .await
    }

    pub async fn get_any_network_info(&self) -> Result<NodeReport<NetworkInfo>, AggregateError> {
        self.dispatcher
            .run(
                "getnetworkinfo",
                &self.targets,
                |rpc| async move { rpc.get_network_info().await },
                &FirstAnswer::new(),
                &self.options,
            )
            .await
    }

    /// Probe every targeted node; fails with
    /// [`AggregateError::NotAllNodesReachable`] unless all of them answer.
    pub async fn test_nodes_connectivity(
        &self,
    ) -> Result<Vec<NodeReport<NetworkInfo>>, AggregateError> {
        self.dispatcher
            .run(
                "connectivity",
                &self.targets,
                |rpc| async move { rpc.get_network_info().await },
                &AllReachable::new(),
                &self.options,
            )
            .await
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Stream a block from the node with the best tip.
    pub async fn get_block_stream(&self, hash: BlockHash) -> Result<BlockStream, BlockStreamError> {
        self.open_bounded(async {
            let tip = self.get_best_blockchain_info().await?;
            let node = &self.endpoints.all()[tip.selected.node.index];
            BlockStream::open(node, hash).await
        })
        .await
    }

    /// Stream a block from one named node.
    pub async fn get_block_stream_from(
        &self,
        id: &NodeId,
        hash: BlockHash,
    ) -> Result<BlockStream, BlockStreamError> {
        let node = self
            .targets
            .iter()
            .find(|n| n.id() == id)
            .ok_or(AggregateError::NoNodesSelected)?;
        self.open_bounded(BlockStream::open(node, hash)).await
    }

    /// Apply the client's cancel token and deadline to opening a stream;
    /// the token also ends the opened stream.
    async fn open_bounded<F>(&self, open: F) -> Result<BlockStream, BlockStreamError>
    where
        F: std::future::Future<Output = Result<BlockStream, BlockStreamError>>,
    {
        let cancelled = async {
            match &self.options.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.options.deadline {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending().await,
            }
        };

        let stream = tokio::select! {
            biased;
            _ = cancelled => {
                tracing::info!("block stream open cancelled by caller");
                return Err(BlockStreamError::Cancelled);
            }
            _ = deadline => {
                let after = self.options.deadline.unwrap_or_default();
                tracing::warn!(?after, "block stream open deadline expired");
                return Err(BlockStreamError::Deadline(after));
            }
            opened = open => opened?,
        };
        Ok(match &self.options.cancel {
            Some(token) => stream.with_cancel(token.clone()),
            None => stream,
        })
    }

    fn record_inconsistency(&self) {
        if let Some(metrics) = self.dispatcher.metrics() {
            metrics.inconsistent_responses.inc();
        }
    }
}

impl std::fmt::Debug for MultiNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiNodeClient")
            .field("targets", &self.targets)
            .field("options", &self.options)
            .field("script_timeout", &self.script_timeout)
            .finish_non_exhaustive()
    }
}
