//! Per-operation outcome reducers.
//!
//! Each reducer names the [`DispatchPolicy`] its operation is collected
//! under and turns the [`Collected`] outcomes into the operation's aggregate
//! result. Reducers are pure: they never call out and never look at the
//! clock, so any interleaving of node answers reduces the same way.

pub mod connectivity;
pub mod lookup;
pub mod script;
pub mod single;
pub mod submission;
pub mod tip;

pub use connectivity::AllReachable;
pub use lookup::{ConsistentLookup, ConsistentResult};
pub use script::{InputVerdict, ScriptVerification, ScriptVerificationReport, Verdict};
pub use single::FirstAnswer;
pub use submission::{
    NodeTxStatus, SubmissionReducer, SubmissionReport, SubmissionStatus, TxSubmissionOutcome,
};
pub use tip::{TipReducer, TipSelection, TipSelectionMode};

use crate::{AggregateError, Collected, DispatchPolicy};

pub trait Reducer<T> {
    type Output;

    fn policy(&self) -> DispatchPolicy<T>;

    fn reduce(&self, collected: Collected<T>) -> Result<Self::Output, AggregateError>;
}
