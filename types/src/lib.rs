//! Fundamental types for the multi-node RPC aggregation layer.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! transaction and block identifiers, chain work, chain-tip info, submission and
//! script-verification payloads, and node endpoint descriptors.

pub mod chain;
pub mod endpoint;
pub mod error;
pub mod hash;
pub mod query;
pub mod script;
pub mod tx;

pub use chain::{BlockHeader, BlockchainInfo, ChainWork};
pub use endpoint::{NodeEndpoint, NodeId, DEFAULT_NODE_TIMEOUT};
pub use error::TypesError;
pub use hash::{BlockHash, TxId};
pub use query::{MerkleProof, NetworkInfo, OutPoint, TxOut};
pub use script::{ScriptCheck, ScriptCheckResult, ScriptCheckStatus};
pub use tx::{NodeSubmitResponse, RejectedTx, TxSubmission};
