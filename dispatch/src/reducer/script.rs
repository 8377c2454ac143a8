//! Script verification across nodes.
//!
//! Each node verifies the whole batch of (transaction, input) pairs within a
//! budget shared by all nodes. An input is valid only if every responding
//! node says so; a single node reporting it invalid makes it invalid. With
//! stop-on-first-invalid, the first such report ends the dispatch and the
//! calls still in flight are aborted.

use multinode_rpc::ErrorKind;
use multinode_types::{NodeId, ScriptCheckResult, ScriptCheckStatus, TxId};

use crate::{
    AggregateError, Collected, DispatchPolicy, NodeFailure, NodeOutcome, NodeReport, Reducer,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Every responding node verified the input.
    Valid,
    Invalid { node: NodeId, reason: String },
    /// Not invalid, but not unanimously valid either (timeouts, skipped
    /// checks, nodes that never answered before an early stop).
    Undetermined { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputVerdict {
    pub txid: TxId,
    pub n: u32,
    pub verdict: Verdict,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScriptVerificationReport {
    /// One verdict per requested pair, in request order.
    pub verdicts: Vec<InputVerdict>,
    /// Collection ended on an invalid report before every node answered.
    pub stopped_early: bool,
    /// Number of nodes whose answers were used.
    pub responders: usize,
    /// Nodes that failed or answered malformed, in configuration order.
    pub failures: Vec<NodeFailure>,
}

impl ScriptVerificationReport {
    pub fn all_valid(&self) -> bool {
        self.verdicts.iter().all(|v| v.verdict == Verdict::Valid)
    }

    pub fn first_invalid(&self) -> Option<&InputVerdict> {
        self.verdicts
            .iter()
            .find(|v| matches!(v.verdict, Verdict::Invalid { .. }))
    }
}

pub struct ScriptVerification {
    inputs: Vec<(TxId, u32)>,
    stop_on_first_invalid: bool,
}

impl ScriptVerification {
    pub fn new(inputs: Vec<(TxId, u32)>, stop_on_first_invalid: bool) -> Self {
        Self {
            inputs,
            stop_on_first_invalid,
        }
    }
}

impl Reducer<Vec<ScriptCheckResult>> for ScriptVerification {
    type Output = ScriptVerificationReport;

    fn policy(&self) -> DispatchPolicy<Vec<ScriptCheckResult>> {
        if self.stop_on_first_invalid {
            DispatchPolicy::stop_on(|o: &NodeOutcome<Vec<ScriptCheckResult>>| {
                o.success()
                    .is_some_and(|results| results.iter().any(ScriptCheckResult::is_invalid))
            })
        } else {
            DispatchPolicy::WaitAll
        }
    }

    fn reduce(
        &self,
        collected: Collected<Vec<ScriptCheckResult>>,
    ) -> Result<ScriptVerificationReport, AggregateError> {
        if !collected.has_success() {
            return Err(collected.no_result_error());
        }
        let stopped_early = collected.stopped_early;
        let targeted = collected.targeted;
        let mut failures = collected.failures();

        let mut responses: Vec<NodeReport<Vec<ScriptCheckResult>>> = Vec::new();
        for report in collected.into_successes() {
            if report.value.len() == self.inputs.len() {
                responses.push(report);
            } else {
                failures.push(NodeFailure::new(
                    report.node,
                    ErrorKind::Protocol,
                    format!(
                        "{} results for {} inputs",
                        report.value.len(),
                        self.inputs.len()
                    ),
                ));
            }
        }
        failures.sort_by_key(|f| f.node.index);
        if responses.is_empty() {
            return Err(AggregateError::from_failures(failures));
        }
        responses.sort_by_key(|r| r.node.index);
        // Nodes aborted by an early stop never voted; only Invalid is final.
        let partial = stopped_early.then(|| {
            format!("early stop: {} of {} nodes answered", responses.len(), targeted)
        });

        let verdicts = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, (txid, n))| InputVerdict {
                txid: *txid,
                n: *n,
                verdict: judge(&responses, i, partial.as_deref()),
            })
            .collect();

        Ok(ScriptVerificationReport {
            verdicts,
            stopped_early,
            responders: responses.len(),
            failures,
        })
    }
}

fn judge(
    responses: &[NodeReport<Vec<ScriptCheckResult>>],
    i: usize,
    partial: Option<&str>,
) -> Verdict {
    if let Some(report) = responses.iter().find(|r| r.value[i].is_invalid()) {
        return Verdict::Invalid {
            node: report.node.id.clone(),
            reason: report.value[i]
                .description
                .clone()
                .unwrap_or_else(|| "script evaluation failed".into()),
        };
    }
    if let Some(reason) = partial {
        return Verdict::Undetermined {
            reason: reason.to_string(),
        };
    }
    match responses
        .iter()
        .find(|r| r.value[i].result != ScriptCheckStatus::Ok)
    {
        None => Verdict::Valid,
        Some(report) => Verdict::Undetermined {
            reason: format!("{}: {:?}", report.node, report.value[i].result),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::test_support::{collected, fail, ok};

    fn status(s: ScriptCheckStatus) -> ScriptCheckResult {
        ScriptCheckResult {
            result: s,
            description: None,
        }
    }

    fn inputs() -> Vec<(TxId, u32)> {
        vec![(TxId::new([1; 32]), 0), (TxId::new([2; 32]), 1)]
    }

    #[test]
    fn unanimous_ok_is_valid() {
        let report = ScriptVerification::new(inputs(), false)
            .reduce(collected(vec![
                ok(0, vec![ScriptCheckResult::ok(), ScriptCheckResult::ok()]),
                ok(1, vec![ScriptCheckResult::ok(), ScriptCheckResult::ok()]),
            ]))
            .unwrap();
        assert!(report.all_valid());
        assert_eq!(report.responders, 2);
    }

    #[test]
    fn single_invalid_wins() {
        let report = ScriptVerification::new(inputs(), false)
            .reduce(collected(vec![
                ok(0, vec![ScriptCheckResult::ok(), ScriptCheckResult::ok()]),
                ok(1, vec![ScriptCheckResult::ok(), ScriptCheckResult::error("OP_EQUALVERIFY")]),
            ]))
            .unwrap();
        assert_eq!(report.verdicts[0].verdict, Verdict::Valid);
        let invalid = report.first_invalid().unwrap();
        assert_eq!(invalid.n, 1);
        assert!(matches!(
            &invalid.verdict,
            Verdict::Invalid { node, reason } if node.as_str() == "node1:8332" && reason == "OP_EQUALVERIFY"
        ));
    }

    #[test]
    fn timeout_or_skip_is_undetermined() {
        let report = ScriptVerification::new(inputs(), false)
            .reduce(collected(vec![
                ok(0, vec![ScriptCheckResult::ok(), status(ScriptCheckStatus::Skipped)]),
                ok(1, vec![status(ScriptCheckStatus::Timeout), ScriptCheckResult::ok()]),
            ]))
            .unwrap();
        assert!(matches!(report.verdicts[0].verdict, Verdict::Undetermined { .. }));
        assert!(matches!(report.verdicts[1].verdict, Verdict::Undetermined { .. }));
    }

    #[test]
    fn malformed_answer_counts_as_failure() {
        let report = ScriptVerification::new(inputs(), false)
            .reduce(collected(vec![
                ok(0, vec![ScriptCheckResult::ok()]),
                ok(1, vec![ScriptCheckResult::ok(), ScriptCheckResult::ok()]),
            ]))
            .unwrap();
        assert!(report.all_valid());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::Protocol);
    }

    #[test]
    fn policy_stops_on_invalid_only_when_asked() {
        let invalid = ok(0, vec![ScriptCheckResult::error("bad")]);
        let one = vec![(TxId::new([1; 32]), 0)];
        assert!(ScriptVerification::new(one.clone(), true)
            .policy()
            .should_stop(&invalid));
        assert!(!ScriptVerification::new(one, false).policy().should_stop(&invalid));
    }

    #[test]
    fn early_stop_leaves_other_inputs_undetermined() {
        let mut partial = collected(vec![ok(
            0,
            vec![ScriptCheckResult::ok(), ScriptCheckResult::error("bad sig")],
        )]);
        partial.targeted = 2;
        partial.stopped_early = true;

        let report = ScriptVerification::new(inputs(), true).reduce(partial).unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.responders, 1);
        assert_eq!(
            report.verdicts[0].verdict,
            Verdict::Undetermined {
                reason: "early stop: 1 of 2 nodes answered".into()
            }
        );
        assert!(matches!(report.verdicts[1].verdict, Verdict::Invalid { .. }));
        assert!(!report.all_valid());
    }

    #[test]
    fn no_answers_is_an_error() {
        let err = ScriptVerification::new(inputs(), true)
            .reduce(collected::<Vec<ScriptCheckResult>>(vec![fail(
                0,
                ErrorKind::Unreachable,
            )]))
            .unwrap_err();
        assert!(matches!(err, AggregateError::AllNodesUnreachable(_)));
    }
}
