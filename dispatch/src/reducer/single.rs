//! Single-value queries: the first node to answer is authoritative.
//!
//! Used for merkle proofs, block headers, tx outputs and network info. No
//! cross-node reconciliation is done for these.

use std::marker::PhantomData;

use crate::{AggregateError, Collected, DispatchPolicy, NodeOutcome, NodeReport, Reducer};

pub struct FirstAnswer<T>(PhantomData<fn() -> T>);

impl<T> FirstAnswer<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FirstAnswer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reducer<T> for FirstAnswer<T> {
    type Output = NodeReport<T>;

    fn policy(&self) -> DispatchPolicy<T> {
        DispatchPolicy::FirstSuccess
    }

    fn reduce(&self, collected: Collected<T>) -> Result<NodeReport<T>, AggregateError> {
        if !collected.has_success() {
            return Err(collected.no_result_error());
        }
        collected
            .outcomes
            .into_iter()
            .find_map(|o| match o {
                NodeOutcome::Success { node, value } => Some(NodeReport { node, value }),
                NodeOutcome::Failure(_) => None,
            })
            .ok_or(AggregateError::NoNodesSelected)
    }
}
