//! Planner: wraps a [`DecisionPolicy`] and performs the side effects of the
//! terminal actions.

use std::sync::Arc;

use tracing::{info, warn};

use crate::change::{render_status_comment, ChangeCollaborator};
use crate::domain::run_state::{Degradation, NextAction, RunState, TestStatus};
use crate::issues::{IssueSync, IssueSyncOutcome};
use crate::obs;
use crate::policy::{Decision, DecisionPolicy, RuleBasedPolicy};

/// Marker that starts the summary of a degraded run.
pub const DEGRADED_MARKER: &str = "[degraded]";

pub struct Planner {
    policy: Arc<dyn DecisionPolicy>,
    change: ChangeCollaborator,
    issues: IssueSync,
}

impl Planner {
    pub fn new(
        policy: Arc<dyn DecisionPolicy>,
        change: ChangeCollaborator,
        issues: IssueSync,
    ) -> Self {
        Self {
            policy,
            change,
            issues,
        }
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Ask the policy for the next action and correct choices the state
    /// cannot support.
    ///
    /// A policy error falls back to the canonical decision. `analyze_failures`
    /// without a failure becomes `summarize`; `run_tests` without a commit SHA
    /// becomes a degraded `summarize`.
    pub async fn decide(&self, state: &mut RunState) -> Decision {
        let mut decision = match self.policy.decide(state).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    run_id = %state.run_id,
                    policy = self.policy.name(),
                    error = %e,
                    "Decision policy failed, using canonical decision"
                );
                RuleBasedPolicy::decision(state)
            }
        };

        if decision.action == NextAction::AnalyzeFailures
            && state.test_status() != TestStatus::Failed
        {
            info!(
                run_id = %state.run_id,
                status = %state.test_status(),
                "Nothing to analyze, summarizing instead"
            );
            decision = Decision::new(NextAction::Summarize, "No failures to analyze");
        }

        if decision.action == NextAction::RunTests && state.commit_sha().is_none() {
            warn!(run_id = %state.run_id, "Cannot run tests without a commit SHA");
            state.mark_degraded(Degradation::UnresolvedCommit);
            decision = Decision::new(NextAction::Summarize, "Commit SHA unresolved");
        }

        obs::emit_decision(&state.run_id, decision.action.as_str(), &decision.rationale);
        decision
    }

    /// Side effects of a terminal action, in order: summary, issue tracker,
    /// then the status comment (which links the issue when one exists).
    pub async fn conclude(&self, state: &mut RunState, action: NextAction) {
        let base = match action {
            NextAction::AnalyzeFailures => match self.policy.analyze_failure(state).await {
                Some(analysis) => analysis,
                None => default_summary(state),
            },
            NextAction::Summarize | NextAction::RunTests => default_summary(state),
        };
        state.summary = Some(compose_summary(state, &base));

        let outcome = match state.test_status() {
            TestStatus::Failed => self.issues.record_failure(state).await,
            TestStatus::Passed => self.issues.record_recovery(state).await,
            TestStatus::Pending => IssueSyncOutcome::Skipped,
        };
        info!(run_id = %state.run_id, outcome = ?outcome, "Issue tracker synced");

        // The tracker may have revealed another disabled integration.
        state.summary = Some(compose_summary(state, &base));

        let body = render_status_comment(state);
        self.change.post_comment(state, &body).await;
    }
}

fn default_summary(state: &RunState) -> String {
    match state.test_status() {
        TestStatus::Passed => "All tests passed successfully.".to_string(),
        TestStatus::Failed => "Test failures detected. See logs for details.".to_string(),
        TestStatus::Pending => "Tests were not run.".to_string(),
    }
}

/// Prefix `base` with the degraded marker and reasons, if any.
pub fn compose_summary(state: &RunState, base: &str) -> String {
    if !state.is_degraded() {
        return base.to_string();
    }
    let reasons = state
        .degraded()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{DEGRADED_MARKER} {reasons}\n\n{base}")
}
