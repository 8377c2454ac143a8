//! Connectivity check: every configured node must answer.

use std::marker::PhantomData;

use crate::{AggregateError, Collected, DispatchPolicy, NodeReport, Reducer};

/// Succeeds only if every targeted node answered; yields the answers in
/// configuration order. Any failure becomes
/// [`AggregateError::NotAllNodesReachable`] listing the nodes that did not.
pub struct AllReachable<T>(PhantomData<fn() -> T>);

impl<T> AllReachable<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for AllReachable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reducer<T> for AllReachable<T> {
    type Output = Vec<NodeReport<T>>;

    fn policy(&self) -> DispatchPolicy<T> {
        DispatchPolicy::WaitAll
    }

    fn reduce(&self, collected: Collected<T>) -> Result<Vec<NodeReport<T>>, AggregateError> {
        let failures = collected.failures();
        if !failures.is_empty() {
            return Err(AggregateError::NotAllNodesReachable(failures));
        }
        let mut reports = collected.into_successes();
        reports.sort_by_key(|r| r.node.index);
        Ok(reports)
    }
}
