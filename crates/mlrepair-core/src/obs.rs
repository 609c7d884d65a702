//! Structured lifecycle events for pipeline runs.
//!
//! - [`ItemSpan`] scopes every log line of one buggy item.
//! - `emit_*` functions log stage start, skip and finish with stable field
//!   names so JSON logs can be aggregated.

use tracing::{info, warn};

/// RAII guard that enters an item-scoped span.
///
/// ```ignore
/// let _span = ItemSpan::enter("bug_42.py");
/// // everything logged here carries item = "bug_42.py"
/// ```
pub struct ItemSpan {
    _span: tracing::span::EnteredSpan,
}

impl ItemSpan {
    pub fn enter(item: &str) -> Self {
        let span = tracing::info_span!("mlrepair.item", item = %item);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, ops: &str, items: usize) {
    info!(event = "run.started", run_id = %run_id, ops = %ops, items = items);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, items: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        items = items,
    );
}

pub fn emit_stage_started(stage: &str, item: &str) {
    info!(event = "stage.started", stage = %stage, item = %item);
}

/// A stage found its checkpoint and did nothing.
pub fn emit_stage_skipped(stage: &str, item: &str, checkpoint: &str) {
    warn!(
        event = "stage.skipped",
        stage = %stage,
        item = %item,
        checkpoint = %checkpoint,
        "checkpoint exists, skipping"
    );
}

pub fn emit_stage_finished(stage: &str, item: &str, produced: usize, cost_secs: f64) {
    info!(
        event = "stage.finished",
        stage = %stage,
        item = %item,
        produced = produced,
        cost_secs = cost_secs,
    );
}

/// A stage could not run because its input checkpoint is missing.
pub fn emit_stage_missing_input(stage: &str, item: &str, input: &str) {
    warn!(event = "stage.missing_input", stage = %stage, item = %item, input = %input);
}

pub fn emit_candidate_rejected(item: &str, candidate: usize, reason: &str) {
    tracing::debug!(event = "filter.rejected", item = %item, candidate = candidate, reason = %reason);
}

pub fn emit_validation(item: &str, artifact: &str, passed: bool, time_cost: f64) {
    info!(
        event = "validate.result",
        item = %item,
        artifact = %artifact,
        passed = passed,
        time_cost = time_cost,
    );
}

/// Non-fatal failure inside a stage (artifact build, heuristic).
pub fn emit_stage_error(stage: &str, item: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.error", stage = %stage, item = %item, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_span_enter() {
        let _span = ItemSpan::enter("bug.py");
        emit_stage_started("mask", "bug.py");
        emit_stage_skipped("mask", "bug.py", "masked.json");
        emit_stage_finished("mask", "bug.py", 3, 0.01);
    }
}
