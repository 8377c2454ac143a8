//! Consistency-checked lookups (raw transactions).
//!
//! Every node is asked; the answer comes from the earliest-configured node
//! that succeeded, and the result states whether every other successful node
//! returned exactly the same bytes. One reachable, correct node is enough
//! for a result; disagreement is flagged, never hidden.

use std::marker::PhantomData;

use crate::{
    AggregateError, Collected, DispatchPolicy, NodeFailure, NodeOutcome, NodeReport, Reducer,
};

/// Outcome of a consistency-checked lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsistentResult<T> {
    /// Value from the earliest-configured node that succeeded.
    pub first_success: NodeReport<T>,
    /// True iff every successful node returned a value equal to `first_success`.
    pub all_successes_identical: bool,
    /// Earliest-configured failure, if any node failed.
    pub first_error: Option<NodeFailure>,
    /// Every failure, in configuration order.
    pub failures: Vec<NodeFailure>,
    pub successes: usize,
}

impl<T> ConsistentResult<T> {
    /// Every node answered and all answers agree.
    pub fn is_unanimous(&self) -> bool {
        self.all_successes_identical && self.failures.is_empty()
    }
}

/// Compares answers with `PartialEq`; for byte payloads this is byte-exact.
pub struct ConsistentLookup<T>(PhantomData<fn() -> T>);

impl<T> ConsistentLookup<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ConsistentLookup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> Reducer<T> for ConsistentLookup<T> {
    type Output = ConsistentResult<T>;

    fn policy(&self) -> DispatchPolicy<T> {
        DispatchPolicy::WaitAll
    }

    fn reduce(&self, collected: Collected<T>) -> Result<ConsistentResult<T>, AggregateError> {
        if !collected.has_success() {
            return Err(collected.no_result_error());
        }
        let failures = collected.failures();
        let mut successes = collected.into_config_order().into_iter().filter_map(|o| match o {
            NodeOutcome::Success { node, value } => Some(NodeReport { node, value }),
            NodeOutcome::Failure(_) => None,
        });

        let first_success = successes.next().ok_or(AggregateError::NoNodesSelected)?;
        let mut count = 1;
        let mut all_successes_identical = true;
        for other in successes {
            count += 1;
            if other.value != first_success.value {
                tracing::warn!(
                    first = %first_success.node,
                    other = %other.node,
                    "nodes returned different content"
                );
                all_successes_identical = false;
            }
        }

        Ok(ConsistentResult {
            first_success,
            all_successes_identical,
            first_error: failures.first().cloned(),
            failures,
            successes: count,
        })
    }
}
