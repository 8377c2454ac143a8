//! Batch transaction submission.
//!
//! The batch is broadcast to every node. Per transaction:
//! - accepted if at least one node accepted it (or already knew it);
//! - rejected only if every responding node refused it with the same
//!   reject code;
//! - conflicting if every responding node refused it but for different
//!   reasons.
//!
//! Per-node detail is kept for diagnostics.

use multinode_types::{NodeSubmitResponse, TxId};

use crate::{AggregateError, Collected, DispatchPolicy, NodeFailure, NodeRef, Reducer};

/// How one node treated one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeTxStatus {
    Accepted,
    /// Already in the node's mempool or chain.
    Known,
    /// Accepted, then evicted from the mempool.
    Evicted,
    Rejected { code: Option<i32>, reason: String },
}

impl NodeTxStatus {
    fn from_response(response: &NodeSubmitResponse, txid: &TxId) -> Self {
        if let Some(rejected) = response.invalid.iter().find(|r| &r.txid == txid) {
            Self::Rejected {
                code: rejected.reject_code,
                reason: rejected.reject_reason.clone(),
            }
        } else if response.evicted.contains(txid) {
            Self::Evicted
        } else if response.known.contains(txid) {
            Self::Known
        } else {
            Self::Accepted
        }
    }

    fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::Known)
    }

    fn reject_code(&self) -> Option<i32> {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => None,
        }
    }

    fn reject_reason(&self) -> &str {
        match self {
            Self::Rejected { reason, .. } => reason,
            Self::Evicted => "evicted",
            Self::Accepted | Self::Known => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionStatus {
    Accepted,
    Rejected { code: Option<i32>, reason: String },
    /// Every responding node refused the transaction, but not for the same reason.
    Conflicting,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxSubmissionOutcome {
    pub txid: TxId,
    pub status: SubmissionStatus,
    /// Responding nodes in configuration order.
    pub per_node: Vec<(NodeRef, NodeTxStatus)>,
}

impl TxSubmissionOutcome {
    /// True iff every responding node treated the transaction alike.
    pub fn nodes_agree(&self) -> bool {
        let accepted = self.per_node.iter().filter(|(_, s)| s.is_accepted()).count();
        match self.status {
            SubmissionStatus::Accepted => accepted == self.per_node.len(),
            SubmissionStatus::Rejected { .. } => true,
            SubmissionStatus::Conflicting => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionReport {
    /// One entry per submitted transaction, in submission order.
    pub transactions: Vec<TxSubmissionOutcome>,
    /// Nodes that did not answer, in configuration order.
    pub failures: Vec<NodeFailure>,
}

impl SubmissionReport {
    pub fn accepted(&self) -> impl Iterator<Item = &TxSubmissionOutcome> {
        self.transactions
            .iter()
            .filter(|t| t.status == SubmissionStatus::Accepted)
    }
}

pub struct SubmissionReducer {
    txids: Vec<TxId>,
}

impl SubmissionReducer {
    pub fn new(txids: Vec<TxId>) -> Self {
        Self { txids }
    }
}

impl Reducer<NodeSubmitResponse> for SubmissionReducer {
    type Output = SubmissionReport;

    fn policy(&self) -> DispatchPolicy<NodeSubmitResponse> {
        DispatchPolicy::WaitAll
    }

    fn reduce(
        &self,
        collected: Collected<NodeSubmitResponse>,
    ) -> Result<SubmissionReport, AggregateError> {
        if !collected.has_success() {
            return Err(collected.no_result_error());
        }
        let failures = collected.failures();
        let mut responses = collected.into_successes();
        responses.sort_by_key(|r| r.node.index);

        let transactions = self
            .txids
            .iter()
            .map(|txid| {
                let per_node: Vec<(NodeRef, NodeTxStatus)> = responses
                    .iter()
                    .map(|r| (r.node.clone(), NodeTxStatus::from_response(&r.value, txid)))
                    .collect();
                let status = merge(&per_node);
                if status != SubmissionStatus::Accepted {
                    tracing::info!(%txid, ?status, "transaction not accepted by any node");
                }
                TxSubmissionOutcome {
                    txid: *txid,
                    status,
                    per_node,
                }
            })
            .collect();

        Ok(SubmissionReport {
            transactions,
            failures,
        })
    }
}

fn merge(per_node: &[(NodeRef, NodeTxStatus)]) -> SubmissionStatus {
    if per_node.iter().any(|(_, s)| s.is_accepted()) {
        return SubmissionStatus::Accepted;
    }
    // Non-empty: reducers only run with at least one response.
    let Some((_, first)) = per_node.first() else {
        return SubmissionStatus::Conflicting;
    };
    let same_reason = per_node.iter().all(|(_, s)| {
        s.reject_code() == first.reject_code()
            && matches!(s, NodeTxStatus::Evicted) == matches!(first, NodeTxStatus::Evicted)
    });
    if same_reason {
        SubmissionStatus::Rejected {
            code: first.reject_code(),
            reason: first.reject_reason().to_string(),
        }
    } else {
        SubmissionStatus::Conflicting
    }
}
