use super::{GrowthDecision, MonitorState};
use crate::lsn;

/// Result of folding one observed WAL position into the monitor state.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: GrowthDecision,

    /// Growth observed on this tick alone
    pub tick_growth: u64,

    /// State to persist for the next tick
    pub state: MonitorState,
}

/// Compute incremental growth for one tick and decide whether the threshold
/// has been crossed.
///
/// The updated state always carries the observed position as the new
/// baseline and the new accumulated total. A `Trigger` decision does NOT
/// reset the counter here; only the controller resets it, after the backup
/// actually succeeds. This evaluator is also agnostic to backup type: the
/// controller resolves full vs incremental, because it knows whether a base
/// backup exists.
pub fn evaluate(current_position: &str, state: &MonitorState, threshold: u64) -> Evaluation {
    let previous = state.last_check_lsn.as_deref().unwrap_or("");
    let tick_growth = lsn::delta(current_position, previous);
    let accumulated = state.accumulated_growth.saturating_add(tick_growth);

    let decision = if accumulated >= threshold {
        GrowthDecision::Trigger
    } else {
        GrowthDecision::NoOp
    };

    let mut next = state.clone();
    next.last_check_lsn = Some(current_position.to_string());
    next.accumulated_growth = accumulated;

    Evaluation {
        decision,
        tick_growth,
        state: next,
    }
}
