//! Best/worst chain-tip selection.
//!
//! Successful answers are ranked by `(chain work, height)`. "Best" takes the
//! maximum and "worst" the minimum; equal keys go to the earliest-configured
//! node. Every per-node outcome is kept for diagnostics.

use multinode_types::BlockchainInfo;

use crate::{
    AggregateError, Collected, DispatchPolicy, NodeFailure, NodeOutcome, NodeReport, Reducer,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TipSelectionMode {
    Best,
    Worst,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TipSelection {
    pub selected: NodeReport<BlockchainInfo>,
    /// Every outcome, in configuration order.
    pub outcomes: Vec<NodeOutcome<BlockchainInfo>>,
}

impl TipSelection {
    pub fn failures(&self) -> Vec<&NodeFailure> {
        self.outcomes.iter().filter_map(NodeOutcome::failure).collect()
    }

    /// True iff every successful node reports the same best block.
    pub fn tips_agree(&self) -> bool {
        self.outcomes
            .iter()
            .filter_map(NodeOutcome::success)
            .all(|info| info.best_block_hash == self.selected.value.best_block_hash)
    }
}

pub struct TipReducer {
    mode: TipSelectionMode,
}

impl TipReducer {
    pub fn best() -> Self {
        Self {
            mode: TipSelectionMode::Best,
        }
    }

    pub fn worst() -> Self {
        Self {
            mode: TipSelectionMode::Worst,
        }
    }

    fn beats(&self, candidate: &BlockchainInfo, current: &BlockchainInfo) -> bool {
        match self.mode {
            TipSelectionMode::Best => candidate.tip_key() > current.tip_key(),
            TipSelectionMode::Worst => candidate.tip_key() < current.tip_key(),
        }
    }
}

impl Reducer<BlockchainInfo> for TipReducer {
    type Output = TipSelection;

    fn policy(&self) -> DispatchPolicy<BlockchainInfo> {
        DispatchPolicy::WaitAll
    }

    fn reduce(&self, collected: Collected<BlockchainInfo>) -> Result<TipSelection, AggregateError> {
        if !collected.has_success() {
            return Err(collected.no_result_error());
        }
        let outcomes = collected.into_config_order();

        // Strict comparison over configuration order keeps the earliest node on ties.
        let mut selected: Option<(usize, &BlockchainInfo)> = None;
        for (pos, outcome) in outcomes.iter().enumerate() {
            if let Some(info) = outcome.success() {
                match selected {
                    Some((_, current)) if !self.beats(info, current) => {}
                    _ => selected = Some((pos, info)),
                }
            }
        }
        let (pos, info) = selected.ok_or(AggregateError::NoNodesSelected)?;
        let selected = NodeReport {
            node: outcomes[pos].node().clone(),
            value: info.clone(),
        };

        tracing::debug!(
            mode = ?self.mode,
            node = %selected.node,
            height = selected.value.blocks,
            "chain tip selected"
        );
        Ok(TipSelection { selected, outcomes })
    }
}
