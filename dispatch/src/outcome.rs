//! Per-node outcomes of one dispatched call.

use std::fmt;

use multinode_rpc::{ErrorKind, RpcError};
use multinode_types::NodeId;

/// A node's identity plus its position in the configuration.
///
/// `index` is the tie-breaker wherever a reducer needs a deterministic
/// "first": the earlier-configured node wins.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub index: usize,
    pub id: NodeId,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Why one node's call failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: NodeRef,
    pub kind: ErrorKind,
    pub detail: String,
}

impl NodeFailure {
    pub fn new(node: NodeRef, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            node,
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_rpc(node: NodeRef, err: &RpcError) -> Self {
        Self::new(node, err.kind(), err.to_string())
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.node, self.kind, self.detail)
    }
}

/// The result of one node's call, produced as soon as that node answers.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeOutcome<T> {
    Success { node: NodeRef, value: T },
    Failure(NodeFailure),
}

impl<T> NodeOutcome<T> {
    pub fn node(&self) -> &NodeRef {
        match self {
            Self::Success { node, .. } => node,
            Self::Failure(f) => &f.node,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&NodeFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(f) => Some(f),
        }
    }
}

/// A value together with the node that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeReport<T> {
    pub node: NodeRef,
    pub value: T,
}
