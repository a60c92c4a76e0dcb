//! Pluggable decision policies for the planner.

use async_trait::async_trait;
use ciboss_remote::ChatClient;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::error::{CiError, Result};
use crate::domain::run_state::{NextAction, RunState, TestStatus};

/// Log characters shown to the chat model when deciding.
const DECIDE_LOG_PREVIEW: usize = 1_000;

/// Log characters shown to the chat model when analyzing a failure.
const ANALYZE_LOG_PREVIEW: usize = 4_000;

/// A policy's choice plus a short reason for the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: NextAction,
    pub rationale: String,
}

impl Decision {
    pub fn new(action: NextAction, rationale: impl Into<String>) -> Self {
        Self {
            action,
            rationale: rationale.into(),
        }
    }
}

/// Chooses the next action from the current Run State.
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn decide(&self, state: &RunState) -> Result<Decision>;

    /// Optional markdown analysis used as the summary of a failed run.
    async fn analyze_failure(&self, _state: &RunState) -> Option<String> {
        None
    }
}

/// The canonical policy shape:
/// pending runs tests, a fresh failure is analyzed, anything else summarizes.
pub fn canonical_action(state: &RunState) -> NextAction {
    match state.test_status() {
        TestStatus::Pending => NextAction::RunTests,
        TestStatus::Failed if state.summary.is_none() => NextAction::AnalyzeFailures,
        TestStatus::Failed | TestStatus::Passed => NextAction::Summarize,
    }
}

/// Deterministic policy implementing [`canonical_action`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPolicy;

impl RuleBasedPolicy {
    pub fn decision(state: &RunState) -> Decision {
        let action = canonical_action(state);
        let rationale = match action {
            NextAction::RunTests => "Starting test execution",
            NextAction::AnalyzeFailures => "Analyzing test failures",
            NextAction::Summarize => "Completing CI workflow",
        };
        Decision::new(action, rationale)
    }
}

#[async_trait]
impl DecisionPolicy for RuleBasedPolicy {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn decide(&self, state: &RunState) -> Result<Decision> {
        Ok(Self::decision(state))
    }
}

/// Policy backed by an OpenAI-compatible chat model.
///
/// Unparseable replies and unknown actions fall back to the canonical
/// decision; transport failures are returned as [`CiError::Policy`].
pub struct ChatPolicy {
    client: ChatClient,
}

#[derive(Debug, Deserialize)]
struct ChatDecision {
    action: String,
    #[serde(default)]
    summary: Option<String>,
}

impl ChatPolicy {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn decide_prompt(state: &RunState) -> String {
        format!(
            "You are a CI boss agent managing CI/CD workflows. Decide the next action.\n\n\
             Repository: {}\nCommit: {}\nPR: {}\nChanged files: {:?}\n\n\
             Test status: {}\nTest logs (preview): {}\n\nPrevious action: {}\n\n\
             Actions:\n\
             - \"run_tests\": run the test suite (tests have not run yet)\n\
             - \"analyze_failures\": analyze failing tests\n\
             - \"summarize\": produce the final summary\n\n\
             Respond with JSON only: \
             {{\"action\": \"run_tests|analyze_failures|summarize\", \
             \"summary\": \"brief explanation\"}}",
            state.repository,
            state.commit_sha().unwrap_or("N/A"),
            state
                .pr_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            state.changed_files(),
            state.test_status(),
            preview(state.test_logs(), DECIDE_LOG_PREVIEW),
            state.next_action.map(NextAction::as_str).unwrap_or("none"),
        )
    }

    fn analyze_prompt(state: &RunState) -> String {
        format!(
            "You are a CI/CD expert. Analyze these test failures.\n\n\
             Repository: {}\nCommit: {}\nChanged files: {:?}\n\n\
             Test logs (truncated):\n{}\n\n\
             Provide a brief summary of what failed, the likely cause based on the changed files, \
             and a suggested fix. Format as concise markdown.",
            state.repository,
            state.commit_sha().unwrap_or("N/A"),
            state.changed_files(),
            preview(state.test_logs(), ANALYZE_LOG_PREVIEW),
        )
    }
}

#[async_trait]
impl DecisionPolicy for ChatPolicy {
    fn name(&self) -> &str {
        "chat"
    }

    async fn decide(&self, state: &RunState) -> Result<Decision> {
        let reply = self
            .client
            .complete(&Self::decide_prompt(state))
            .await
            .map_err(|e| CiError::Policy(e.to_string()))?;

        match parse_chat_decision(&reply) {
            Some(decision) => Ok(decision),
            None => {
                warn!(
                    run_id = %state.run_id,
                    model = self.client.model(),
                    "Chat reply had no usable action, using canonical decision"
                );
                Ok(RuleBasedPolicy::decision(state))
            }
        }
    }

    async fn analyze_failure(&self, state: &RunState) -> Option<String> {
        match self.client.complete(&Self::analyze_prompt(state)).await {
            Ok(analysis) if !analysis.trim().is_empty() => Some(analysis.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Failure analysis unavailable");
                None
            }
        }
    }
}

/// Find the first JSON object in `reply` with a known `action`.
pub fn parse_chat_decision(reply: &str) -> Option<Decision> {
    for (idx, _) in reply.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&reply[idx..]).into_iter::<ChatDecision>();
        let Some(Ok(parsed)) = stream.next() else {
            continue;
        };
        match parsed.action.parse::<NextAction>() {
            Ok(action) => {
                let rationale = parsed
                    .summary
                    .unwrap_or_else(|| "Proceeding with CI workflow".to_string());
                return Some(Decision::new(action, rationale));
            }
            Err(e) => {
                debug!(error = %e, "Ignoring chat decision");
                return None;
            }
        }
    }
    None
}

fn preview(logs: Option<&str>, max_chars: usize) -> String {
    match logs {
        Some(logs) if !logs.is_empty() => ciboss_ci::truncate_chars(logs, max_chars),
        _ => "N/A".to_string(),
    }
}
