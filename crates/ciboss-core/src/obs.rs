//! Structured lifecycle events for orchestration runs.
//!
//! - Run-scoped tracing span (`RunSpan`)
//! - `emit_*` functions for run start/finish, node transitions, planner
//!   decisions and the loop bound
//!
//! Every event carries an `event` field (`run.started`, `run.transition`, ...)
//! so log pipelines can filter on it.

use tracing::{info, warn};
use uuid::Uuid;

/// Run-scoped span; the orchestrator instruments each run's future with it.
pub struct RunSpan;

impl RunSpan {
    /// Span tagged with the run id and repository.
    pub fn span(run_id: &Uuid, repository: &str) -> tracing::Span {
        tracing::info_span!("ciboss.run", run_id = %run_id, repository = %repository)
    }
}

pub fn emit_run_started(run_id: &Uuid, repository: &str, max_cycles: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        repository = %repository,
        max_cycles = max_cycles,
    );
}

/// Emit event: the orchestrator moved from one node to another.
pub fn emit_transition(run_id: &Uuid, from: &str, to: &str) {
    info!(event = "run.transition", run_id = %run_id, from = from, to = to);
}

pub fn emit_decision(run_id: &Uuid, action: &str, rationale: &str) {
    info!(
        event = "planner.decided",
        run_id = %run_id,
        action = action,
        rationale = rationale,
    );
}

/// Emit event: planner asked for more tests than the cycle limit allows.
pub fn emit_loop_bound_exceeded(run_id: &Uuid, max_cycles: u32, test_runs: u32) {
    warn!(
        event = "run.loop_bound_exceeded",
        run_id = %run_id,
        max_cycles = max_cycles,
        test_runs = test_runs,
    );
}

pub fn emit_run_finished(
    run_id: &Uuid,
    duration_ms: u64,
    test_status: &str,
    test_runs: u32,
    degraded: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        test_status = test_status,
        test_runs = test_runs,
        degraded = degraded,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = RunSpan::span(&Uuid::new_v4(), "acme/widgets").entered();
        emit_transition(&Uuid::nil(), "github", "planner");
    }
}
