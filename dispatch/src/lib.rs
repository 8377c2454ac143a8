//! Multi-node RPC aggregation.
//!
//! Issues one logical query against every configured full node concurrently
//! and reduces the individually fallible answers into a single result:
//!
//! - [`NodeEndpointSet`] — the static, validated list of nodes.
//! - [`Dispatcher`] — spawns one bounded call per node and collects
//!   [`NodeOutcome`]s under a [`DispatchPolicy`].
//! - [`reducer`] — per-operation selection and consistency rules.
//! - [`BlockStream`] — incremental reads of a full block from one node.
//! - [`MultiNodeClient`] — the caller-facing operations.

pub mod block_stream;
pub mod cancel;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod endpoint_set;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod outcome;
pub mod policy;
pub mod reducer;

pub use block_stream::{BlockStream, BlockStreamError};
pub use cancel::{CancelSource, CancelToken};
pub use client::{MultiNodeClient, DEFAULT_SCRIPT_VERIFICATION_TIMEOUT};
pub use config::{MultiClientConfig, NodeConfig};
pub use dispatcher::{Collected, Dispatcher, OutcomeStream};
pub use endpoint_set::{ConfiguredNode, NodeEndpointSet};
pub use error::{AggregateError, ConfigError};
pub use logging::{init_logging, try_init_logging, LogFormat};
pub use metrics::DispatchMetrics;
pub use outcome::{NodeFailure, NodeOutcome, NodeRef, NodeReport};
pub use policy::{DispatchOptions, DispatchPolicy, TimeoutMode};
pub use reducer::Reducer;
