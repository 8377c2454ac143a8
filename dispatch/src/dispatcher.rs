//! Fan-out/fan-in dispatch engine.
//!
//! [`Dispatcher::dispatch`] spawns one tokio task per targeted node and
//! returns an [`OutcomeStream`] that yields [`NodeOutcome`]s in the order
//! nodes answer. Each task is owned by an abort-on-drop guard inside the
//! stream, so dropping or cancelling the stream aborts every call still in
//! flight. [`Dispatcher::collect`] drives the stream until the
//! [`DispatchPolicy`] is satisfied, the caller cancels, or the deadline hits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, Stream, StreamExt};
use tokio::task::JoinHandle;

use multinode_rpc::{ErrorKind, NodeRpc, RpcError};

use crate::{
    AggregateError, ConfiguredNode, DispatchMetrics, DispatchOptions, DispatchPolicy, NodeFailure,
    NodeOutcome, NodeRef, NodeReport, Reducer, TimeoutMode,
};

/// Aborts the wrapped task when dropped. A no-op once the task finished.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Outcomes of one dispatch, yielded as nodes answer.
///
/// Aborted calls never appear: they are neither successes nor failures.
pub struct OutcomeStream<T> {
    pending: FuturesUnordered<BoxFuture<'static, Option<NodeOutcome<T>>>>,
}

impl<T> OutcomeStream<T> {
    /// Number of calls still in flight.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Abort every call still in flight; returns how many were aborted.
    pub fn cancel(&mut self) -> usize {
        let aborted = self.pending.len();
        self.pending.clear();
        aborted
    }
}

impl<T> Stream for OutcomeStream<T> {
    type Item = NodeOutcome<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.pending.poll_next_unpin(cx) {
                Poll::Ready(Some(Some(outcome))) => return Poll::Ready(Some(outcome)),
                Poll::Ready(Some(None)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Everything a dispatch collected before its stopping condition.
#[derive(Debug)]
pub struct Collected<T> {
    /// In arrival order.
    pub outcomes: Vec<NodeOutcome<T>>,
    /// Number of nodes the call was sent to.
    pub targeted: usize,
    /// The policy stopped collection while calls were still in flight.
    pub stopped_early: bool,
    /// The shared budget, when one applied and at least one node exhausted it.
    pub budget_exhausted: Option<Duration>,
}

impl<T> Collected<T> {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn has_success(&self) -> bool {
        self.outcomes.iter().any(NodeOutcome::is_success)
    }

    /// Failures in configuration order.
    pub fn failures(&self) -> Vec<NodeFailure> {
        let mut failures: Vec<NodeFailure> =
            self.outcomes.iter().filter_map(|o| o.failure().cloned()).collect();
        failures.sort_by_key(|f| f.node.index);
        failures
    }

    /// The error to surface when no node produced a usable value.
    pub fn no_result_error(&self) -> AggregateError {
        match self.budget_exhausted {
            Some(after) => AggregateError::Timeout {
                after,
                failures: self.failures(),
            },
            None => AggregateError::from_failures(self.failures()),
        }
    }

    /// Outcomes reordered by configuration order.
    pub fn into_config_order(mut self) -> Vec<NodeOutcome<T>> {
        self.outcomes.sort_by_key(|o| o.node().index);
        self.outcomes
    }

    /// Successful reports in arrival order.
    pub fn into_successes(self) -> Vec<NodeReport<T>> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                NodeOutcome::Success { node, value } => Some(NodeReport { node, value }),
                NodeOutcome::Failure(_) => None,
            })
            .collect()
    }
}

enum Step<T> {
    Outcome(Option<NodeOutcome<T>>),
    Cancelled,
    DeadlineExpired,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<DispatchMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    pub fn metrics(&self) -> Option<&Arc<DispatchMetrics>> {
        self.metrics.as_ref()
    }

    /// Start `call` on every node and stream the outcomes back.
    ///
    /// Must be called within a tokio runtime.
    pub fn dispatch<T, F, Fut>(
        &self,
        nodes: &[Arc<ConfiguredNode>],
        call: F,
        timeout: TimeoutMode,
    ) -> OutcomeStream<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn NodeRpc>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
    {
        let pending = FuturesUnordered::new();
        for node in nodes {
            let node_ref = node.node_ref().clone();
            let limit = match timeout {
                TimeoutMode::PerNode => node.endpoint().timeout,
                TimeoutMode::Shared(budget) => budget,
            };
            let fut = call(node.client());
            let task = AbortOnDrop(tokio::spawn(async move {
                match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(RpcError::Timeout(limit)),
                }
            }));
            pending.push(join_outcome(node_ref, task).boxed());
        }
        OutcomeStream { pending }
    }

    /// Dispatch and collect outcomes until `policy` says stop.
    pub async fn collect<T, F, Fut>(
        &self,
        operation: &'static str,
        nodes: &[Arc<ConfiguredNode>],
        call: F,
        policy: &DispatchPolicy<T>,
        options: &DispatchOptions,
    ) -> Result<Collected<T>, AggregateError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn NodeRpc>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
    {
        if nodes.is_empty() {
            return Err(AggregateError::NoNodesSelected);
        }
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(AggregateError::Cancelled);
        }
        if let Some(metrics) = &self.metrics {
            metrics.dispatches.with_label_values(&[operation]).inc();
        }

        let started = Instant::now();
        let mut stream = self.dispatch(nodes, call, options.timeout);
        let mut outcomes = Vec::with_capacity(nodes.len());
        let mut stopped_early = false;
        let mut budget_exhausted = None;

        let deadline = async {
            match options.deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let step = match &options.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => Step::Cancelled,
                    _ = &mut deadline => Step::DeadlineExpired,
                    outcome = stream.next() => Step::Outcome(outcome),
                },
                None => tokio::select! {
                    biased;
                    _ = &mut deadline => Step::DeadlineExpired,
                    outcome = stream.next() => Step::Outcome(outcome),
                },
            };

            let outcome = match step {
                Step::Outcome(Some(outcome)) => outcome,
                Step::Outcome(None) => break,
                Step::Cancelled => {
                    let aborted = stream.cancel();
                    tracing::info!(operation, aborted, "dispatch cancelled by caller");
                    self.record_abort();
                    return Err(AggregateError::Cancelled);
                }
                Step::DeadlineExpired => {
                    let aborted = stream.cancel();
                    let after = options.deadline.unwrap_or_default();
                    tracing::warn!(operation, aborted, ?after, "dispatch deadline expired");
                    self.record_abort();
                    let mut failures: Vec<NodeFailure> =
                        outcomes.iter().filter_map(|o: &NodeOutcome<T>| o.failure().cloned()).collect();
                    failures.sort_by_key(|f| f.node.index);
                    return Err(AggregateError::Timeout { after, failures });
                }
            };

            if let NodeOutcome::Failure(failure) = &outcome {
                tracing::warn!(
                    operation,
                    node = %failure.node,
                    kind = ?failure.kind,
                    detail = %failure.detail,
                    "node call failed"
                );
                self.record_failure(failure);
                if failure.kind == ErrorKind::Timeout {
                    if let TimeoutMode::Shared(budget) = options.timeout {
                        budget_exhausted = Some(budget);
                    }
                }
            } else {
                tracing::debug!(operation, node = %outcome.node(), "node call succeeded");
            }

            let stop = policy.should_stop(&outcome);
            outcomes.push(outcome);
            if stop {
                let aborted = stream.cancel();
                if aborted > 0 {
                    stopped_early = true;
                    tracing::debug!(operation, aborted, "stopping condition met");
                    if let Some(metrics) = &self.metrics {
                        metrics.early_stops.inc();
                    }
                }
                break;
            }
        }

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics
                .dispatch_latency_ms
                .observe(elapsed.as_secs_f64() * 1000.0);
        }
        tracing::debug!(
            operation,
            targeted = nodes.len(),
            answered = outcomes.len(),
            ?elapsed,
            "dispatch complete"
        );

        Ok(Collected {
            outcomes,
            targeted: nodes.len(),
            stopped_early,
            budget_exhausted,
        })
    }

    /// Collect under the reducer's policy and reduce.
    pub async fn run<T, F, Fut, R>(
        &self,
        operation: &'static str,
        nodes: &[Arc<ConfiguredNode>],
        call: F,
        reducer: &R,
        options: &DispatchOptions,
    ) -> Result<R::Output, AggregateError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn NodeRpc>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
        R: Reducer<T>,
    {
        let collected = self
            .collect(operation, nodes, call, &reducer.policy(), options)
            .await?;
        reducer.reduce(collected)
    }

    fn record_failure(&self, failure: &NodeFailure) {
        if let Some(metrics) = &self.metrics {
            metrics.node_failures.inc();
            if failure.kind == ErrorKind::Timeout {
                metrics.node_timeouts.inc();
            }
        }
    }

    fn record_abort(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.aborted.inc();
        }
    }
}

async fn join_outcome<T>(
    node: NodeRef,
    mut task: AbortOnDrop<Result<T, RpcError>>,
) -> Option<NodeOutcome<T>> {
    match (&mut task.0).await {
        Ok(Ok(value)) => Some(NodeOutcome::Success { node, value }),
        Ok(Err(e)) => Some(NodeOutcome::Failure(NodeFailure::from_rpc(node, &e))),
        Err(e) if e.is_cancelled() => None,
        Err(e) => Some(NodeOutcome::Failure(NodeFailure::new(
            node,
            ErrorKind::Protocol,
            format!("call panicked: {e}"),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelSource, NodeEndpointSet};
    use multinode_nullables::{null_endpoint, NullNode};
    use multinode_types::BlockchainInfo;

    fn set_of(nodes: Vec<NullNode>) -> (NodeEndpointSet, Vec<Arc<NullNode>>) {
        let nodes: Vec<Arc<NullNode>> = nodes.into_iter().map(Arc::new).collect();
        let entries = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let client: Arc<dyn NodeRpc> = n.clone();
                (null_endpoint(i), client)
            })
            .collect();
        (NodeEndpointSet::new(entries).unwrap(), nodes)
    }

    async fn tip(rpc: Arc<dyn NodeRpc>) -> Result<BlockchainInfo, RpcError> {
        rpc.get_blockchain_info().await
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_arrive_in_response_order() {
        let (set, _) = set_of(vec![
            NullNode::new().with_tip(1, 1).with_delay(Duration::from_millis(30)),
            NullNode::new().with_tip(2, 2).with_delay(Duration::from_millis(10)),
            NullNode::new().with_tip(3, 3).with_delay(Duration::from_millis(20)),
        ]);
        let stream = Dispatcher::new().dispatch(set.all(), tip, TimeoutMode::PerNode);
        let order: Vec<usize> = stream.map(|o| o.node().index).collect().await;
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn per_node_timeout_becomes_failure() {
        let (set, _) = set_of(vec![NullNode::new().hanging(), NullNode::new().with_tip(1, 1)]);
        let collected = Dispatcher::new()
            .collect("tip", set.all(), tip, &DispatchPolicy::WaitAll, &DispatchOptions::default())
            .await
            .unwrap();
        assert_eq!(collected.outcomes.len(), 2);
        let failures = collected.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, ErrorKind::Timeout);
        assert_eq!(failures[0].node.index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_aborts_slower_nodes() {
        let (set, nodes) = set_of(vec![
            NullNode::new().with_tip(1, 1).with_delay(Duration::from_millis(50)),
            NullNode::new().with_tip(2, 2).with_delay(Duration::from_millis(10)),
        ]);
        let collected = Dispatcher::new()
            .collect(
                "tip",
                set.all(),
                tip,
                &DispatchPolicy::FirstSuccess,
                &DispatchOptions::default(),
            )
            .await
            .unwrap();
        assert!(collected.stopped_early);
        assert_eq!(collected.outcomes.len(), 1);
        assert_eq!(collected.outcomes[0].node().index, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(nodes[0].started_calls(), 1);
        assert_eq!(nodes[0].completed_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_aborts_everything() {
        let (set, nodes) = set_of(vec![
            NullNode::new().with_tip(1, 1).with_delay(Duration::from_millis(50)),
            NullNode::new().with_tip(2, 2).with_delay(Duration::from_millis(50)),
        ]);
        let source = CancelSource::new();
        let options = DispatchOptions {
            cancel: Some(source.token()),
            ..DispatchOptions::default()
        };
        let dispatcher = Dispatcher::new();
        let run = dispatcher.collect("tip", set.all(), tip, &DispatchPolicy::WaitAll, &options);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            source.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);
        assert_eq!(result.unwrap_err(), AggregateError::Cancelled);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(nodes.iter().all(|n| n.completed_calls() == 0));
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_dispatch() {
        let (set, nodes) = set_of(vec![NullNode::new().with_tip(1, 1)]);
        let source = CancelSource::new();
        source.cancel();
        let options = DispatchOptions {
            cancel: Some(source.token()),
            ..DispatchOptions::default()
        };
        let result = Dispatcher::new()
            .collect("tip", set.all(), tip, &DispatchPolicy::WaitAll, &options)
            .await;
        assert_eq!(result.unwrap_err(), AggregateError::Cancelled);
        assert_eq!(nodes[0].started_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_with_timeout() {
        let (set, _) = set_of(vec![
            NullNode::new().failing(RpcError::Protocol("garbage".into())),
            NullNode::new().hanging(),
        ]);
        let options = DispatchOptions {
            deadline: Some(Duration::from_millis(200)),
            ..DispatchOptions::default()
        };
        let err = Dispatcher::new()
            .collect("tip", set.all(), tip, &DispatchPolicy::WaitAll, &options)
            .await
            .unwrap_err();
        match err {
            AggregateError::Timeout { after, failures } => {
                assert_eq!(after, Duration::from_millis(200));
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].kind, ErrorKind::Protocol);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shared_budget_marks_exhaustion() {
        let (set, _) = set_of(vec![NullNode::new().hanging(), NullNode::new().hanging()]);
        let options = DispatchOptions {
            timeout: TimeoutMode::Shared(Duration::from_millis(100)),
            ..DispatchOptions::default()
        };
        let collected = Dispatcher::new()
            .collect("tip", set.all(), tip, &DispatchPolicy::WaitAll, &options)
            .await
            .unwrap();
        assert_eq!(collected.budget_exhausted, Some(Duration::from_millis(100)));
        assert!(matches!(
            collected.no_result_error(),
            AggregateError::Timeout { ref failures, .. } if failures.len() == 2
        ));
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let result = Dispatcher::new()
            .collect("tip", &[], tip, &DispatchPolicy::WaitAll, &DispatchOptions::default())
            .await;
        assert_eq!(result.unwrap_err(), AggregateError::NoNodesSelected);
    }

    #[tokio::test]
    async fn metrics_track_failures() {
        let metrics = Arc::new(DispatchMetrics::new());
        let (set, _) = set_of(vec![
            NullNode::new().failing(RpcError::Unreachable("refused".into())),
            NullNode::new().with_tip(1, 1),
        ]);
        Dispatcher::with_metrics(Arc::clone(&metrics))
            .collect("tip", set.all(), tip, &DispatchPolicy::WaitAll, &DispatchOptions::default())
            .await
            .unwrap();
        assert_eq!(metrics.node_failures.get(), 1);
        assert_eq!(metrics.dispatches.with_label_values(&["tip"]).get(), 1);
    }
}
