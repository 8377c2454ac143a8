//! RPC error types.

use std::time::Duration;

use thiserror::Error;

/// bitcoind's `RPC_INVALID_ADDRESS_OR_KEY`, returned for unknown txids and blocks.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

/// A failed call against a single node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

/// Coarse classification of a per-node failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unreachable,
    Timeout,
    /// Malformed or unexpected response, including a stream cut short.
    Protocol,
    /// The node answered with an RPC-level error.
    Rejected,
    NotFound,
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::Unreachable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(_) | Self::Interrupted(_) => ErrorKind::Protocol,
            Self::Node { .. } => ErrorKind::Rejected,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Map a JSON-RPC error object, folding "not found" codes into [`RpcError::NotFound`].
    pub fn from_node(code: i64, message: String) -> Self {
        if code == RPC_INVALID_ADDRESS_OR_KEY {
            Self::NotFound(message)
        } else {
            Self::Node { code, message }
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
