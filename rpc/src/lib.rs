//! Per-node RPC layer.
//!
//! Defines the [`NodeRpc`] contract every node client implements, the
//! transport-level [`RpcError`] taxonomy, and [`HttpNodeClient`], a thin
//! bitcoind-style JSON-RPC client over HTTP.

pub mod client;
pub mod error;
pub mod http;
pub mod wire;

pub use client::{ChunkStream, NodeRpc};
pub use error::{ErrorKind, RpcError};
pub use http::HttpNodeClient;
