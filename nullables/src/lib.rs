//! Nullable infrastructure for deterministic testing.
//!
//! [`NullNode`] implements the per-node RPC contract entirely in memory.
//! Answers, latency and failures are scripted up front, so dispatch and
//! reducer behavior can be driven on tokio's paused clock without ever
//! opening a socket.
//!
//! Usage: pair a `NullNode` with [`null_endpoint`] and hand both to the
//! endpoint set in place of an HTTP client.

pub mod node;

pub use node::{null_endpoint, NullNode};
