//! Operation-level and configuration errors.

use std::time::Duration;

use thiserror::Error;

use multinode_rpc::{ErrorKind, RpcError};
use multinode_types::{NodeId, TypesError};

use crate::NodeFailure;

fn list(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why an operation produced no result.
///
/// Every variant that follows a dispatch names the per-node failures that
/// caused it, in configuration order.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregateError {
    #[error("no nodes selected for the operation")]
    NoNodesSelected,

    #[error("all {} nodes unreachable: {}", .0.len(), list(.0))]
    AllNodesUnreachable(Vec<NodeFailure>),

    #[error("all {} nodes failed: {}", .0.len(), list(.0))]
    AllNodesFailed(Vec<NodeFailure>),

    #[error("timed out after {after:?}: {}", list(failures))]
    Timeout {
        after: Duration,
        failures: Vec<NodeFailure>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{} of the nodes are not reachable: {}", .0.len(), list(.0))]
    NotAllNodesReachable(Vec<NodeFailure>),
}

impl AggregateError {
    /// Classify a set of failures from which no result could be built.
    pub fn from_failures(mut failures: Vec<NodeFailure>) -> Self {
        failures.sort_by_key(|f| f.node.index);
        if !failures.is_empty() && failures.iter().all(|f| f.kind == ErrorKind::Unreachable) {
            Self::AllNodesUnreachable(failures)
        } else {
            Self::AllNodesFailed(failures)
        }
    }

    pub fn failures(&self) -> &[NodeFailure] {
        match self {
            Self::AllNodesUnreachable(f) | Self::AllNodesFailed(f) | Self::NotAllNodesReachable(f) => f,
            Self::Timeout { failures, .. } => failures,
            Self::NoNodesSelected | Self::Cancelled => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no nodes configured")]
    Empty,

    #[error("node {0} configured more than once")]
    Duplicate(NodeId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] TypesError),

    #[error("transport setup failed: {0}")]
    Transport(#[from] RpcError),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
