//! When a dispatch stops collecting, and how its calls are time-bounded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{CancelToken, NodeOutcome};

pub type StopPredicate<T> = Arc<dyn Fn(&NodeOutcome<T>) -> bool + Send + Sync>;

/// Stopping condition for collecting outcomes.
///
/// Whatever the policy, a dispatch also ends once every targeted node has
/// answered. When it stops early, calls still in flight are aborted and
/// excluded from the result.
pub enum DispatchPolicy<T> {
    /// Wait for every node (chain tip, consistency and quorum checks).
    WaitAll,
    /// Stop at the first successful answer.
    FirstSuccess,
    /// Stop as soon as an outcome satisfies the predicate; the outcome that
    /// triggered the stop is kept.
    StopOnCondition(StopPredicate<T>),
}

impl<T> DispatchPolicy<T> {
    pub fn stop_on(predicate: impl Fn(&NodeOutcome<T>) -> bool + Send + Sync + 'static) -> Self {
        Self::StopOnCondition(Arc::new(predicate))
    }

    pub fn should_stop(&self, outcome: &NodeOutcome<T>) -> bool {
        match self {
            Self::WaitAll => false,
            Self::FirstSuccess => outcome.is_success(),
            Self::StopOnCondition(predicate) => predicate(outcome),
        }
    }
}

impl<T> Clone for DispatchPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::WaitAll => Self::WaitAll,
            Self::FirstSuccess => Self::FirstSuccess,
            Self::StopOnCondition(p) => Self::StopOnCondition(Arc::clone(p)),
        }
    }
}

impl<T> fmt::Debug for DispatchPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitAll => f.write_str("WaitAll"),
            Self::FirstSuccess => f.write_str("FirstSuccess"),
            Self::StopOnCondition(_) => f.write_str("StopOnCondition(..)"),
        }
    }
}

/// How each per-node call is time-bounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeoutMode {
    /// Each call is bounded by its own node's configured timeout.
    #[default]
    PerNode,
    /// One budget shared by all nodes, measured from the start of the dispatch.
    Shared(Duration),
}

/// Caller-side controls for one dispatch.
#[derive(Clone, Debug, Default)]
pub struct DispatchOptions {
    pub timeout: TimeoutMode,
    /// Aborts every pending call and fails the operation with `Cancelled`.
    pub cancel: Option<CancelToken>,
    /// Hard limit on the whole operation; on expiry every pending call is
    /// aborted and the operation fails with `Timeout`.
    pub deadline: Option<Duration>,
}
