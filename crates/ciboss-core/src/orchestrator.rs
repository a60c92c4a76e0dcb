//! The run state machine.
//!
//! ```text
//! github ──▶ planner ──(run_tests)──▶ test_runner
//!               ▲  │                      │
//!               │  └──(otherwise)──▶ end  │
//!               └─────────────────────────┘
//! ```
//!
//! Routing lives in [`route`]; the orchestrator only follows it. The
//! planner ↔ test_runner loop is bounded by `max_cycles` test executions.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ciboss_ci::CommandRunner;
use ciboss_remote::{ChatClient, GithubClient, LinearClient};
use serde::{Deserialize, Serialize};
use tracing::{error, info, Instrument};

use crate::change::{ChangeCollaborator, DisabledSourceHost, SourceHost};
use crate::config::{CiBossConfig, Integration, DEFAULT_MAX_CYCLES};
use crate::domain::error::{CiError, Result};
use crate::domain::run_state::{Degradation, NextAction, RunState};
use crate::executor::{run_test_cycle, TestExecutor};
use crate::issues::{DisabledIssueTracker, IssueSync, IssueTracker};
use crate::obs::{self, RunSpan};
use crate::planner::Planner;
use crate::policy::{ChatPolicy, DecisionPolicy, RuleBasedPolicy};

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Github,
    Planner,
    TestRunner,
    End,
}

impl Node {
    pub fn as_str(self) -> &'static str {
        match self {
            Node::Github => "github",
            Node::Planner => "planner",
            Node::TestRunner => "test_runner",
            Node::End => "end",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing table: the node that follows `from`, given the planner's choice.
///
/// Returns `None` for `end`, which has no successor.
pub fn route(from: Node, next_action: Option<NextAction>) -> Option<Node> {
    match from {
        Node::Github => Some(Node::Planner),
        Node::Planner => match next_action {
            Some(NextAction::RunTests) => Some(Node::TestRunner),
            _ => Some(Node::End),
        },
        Node::TestRunner => Some(Node::Planner),
        Node::End => None,
    }
}

/// One edge taken during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Node,
    pub to: Node,
    pub next_action: Option<NextAction>,
}

/// Final state of a run plus the path it took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub transitions: Vec<Transition>,
}

impl RunReport {
    /// Nodes visited, starting with `github`.
    pub fn path(&self) -> Vec<Node> {
        let mut path = vec![Node::Github];
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }
}

/// Sequences the collaborators over one [`RunState`].
///
/// Holds no per-run data, so one instance can drive any number of
/// concurrent runs.
pub struct Orchestrator {
    change: ChangeCollaborator,
    executor: Arc<dyn TestExecutor>,
    planner: Planner,
    max_cycles: u32,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    /// Drive `state` from `github` to `end`. Never fails: every problem is
    /// absorbed into the returned state or the logs.
    pub async fn run(&self, state: RunState) -> RunReport {
        let span = RunSpan::span(&state.run_id, &state.repository.full_name());
        self.run_inner(state).instrument(span).await
    }

    async fn run_inner(&self, mut state: RunState) -> RunReport {
        let started = Instant::now();
        obs::emit_run_started(&state.run_id, &state.repository.full_name(), self.max_cycles);

        let mut transitions = Vec::new();
        let mut node = Node::Github;
        while node != Node::End {
            match node {
                Node::Github => self.change.gather(&mut state).await,
                Node::Planner => self.plan(&mut state).await,
                Node::TestRunner => {
                    if let Err(e) = run_test_cycle(self.executor.as_ref(), &mut state).await {
                        error!(run_id = %state.run_id, error = %e, "Test runner refused to run");
                    }
                }
                Node::End => {}
            }

            let Some(next) = route(node, state.next_action) else {
                break;
            };
            obs::emit_transition(&state.run_id, node.as_str(), next.as_str());
            transitions.push(Transition {
                from: node,
                to: next,
                next_action: state.next_action,
            });
            node = next;
        }

        obs::emit_run_finished(
            &state.run_id,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            state.test_status().as_str(),
            state.test_runs(),
            state.is_degraded(),
        );
        RunReport { state, transitions }
    }

    /// The `planner` node: decide, enforce the loop bound, and run the
    /// terminal side effects when the run is ending.
    async fn plan(&self, state: &mut RunState) {
        let mut action = self.planner.decide(state).await.action;

        if action == NextAction::RunTests && state.test_runs() >= self.max_cycles {
            obs::emit_loop_bound_exceeded(&state.run_id, self.max_cycles, state.test_runs());
            let bound = CiError::LoopBoundExceeded {
                max_cycles: self.max_cycles,
            };
            info!(run_id = %state.run_id, error = %bound, "Forcing summarize");
            state.mark_degraded(Degradation::LoopBoundExceeded {
                max_cycles: self.max_cycles,
            });
            action = NextAction::Summarize;
        }

        state.next_action = Some(action);
        if action.is_terminal() {
            self.planner.conclude(state, action).await;
        }
    }
}

/// Wires an [`Orchestrator`] from collaborators.
///
/// Anything not supplied falls back to the disabled integration or the
/// default: no source host, no issue tracker, the rule-based policy, the
/// default test command.
pub struct OrchestratorBuilder {
    source_host: Option<Arc<dyn SourceHost>>,
    executor: Option<Arc<dyn TestExecutor>>,
    issue_tracker: Option<Arc<dyn IssueTracker>>,
    policy: Option<Arc<dyn DecisionPolicy>>,
    max_cycles: u32,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            source_host: None,
            executor: None,
            issue_tracker: None,
            policy: None,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

impl OrchestratorBuilder {
    /// Builder with the real clients for every configured integration.
    pub fn from_config(config: &CiBossConfig) -> Result<Self> {
        let mut builder = Self::default()
            .executor(Arc::new(CommandRunner::new(config.test_command.clone())))
            .max_cycles(config.max_cycles);

        if let Some(github) = config.github.enabled() {
            let client =
                GithubClient::new(github.clone()).map_err(|e| CiError::upstream("github", e))?;
            builder = builder.source_host(Arc::new(client));
        }

        match &config.linear {
            Integration::Enabled(linear) => {
                let client = LinearClient::new(linear.clone())
                    .map_err(|e| CiError::upstream("linear", e))?;
                builder = builder.issue_tracker(Arc::new(client));
            }
            Integration::Disabled { key } => {
                builder = builder.issue_tracker(Arc::new(DisabledIssueTracker::missing(*key)));
            }
        }

        if let Some(chat) = config.chat.enabled() {
            let client = ChatClient::new(chat.clone()).map_err(|e| CiError::upstream("chat", e))?;
            builder = builder.policy(Arc::new(ChatPolicy::new(client)));
        }

        Ok(builder)
    }

    pub fn source_host(mut self, host: Arc<dyn SourceHost>) -> Self {
        self.source_host = Some(host);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn issue_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.issue_tracker = Some(tracker);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Maximum test executions per run; values below 1 are raised to 1.
    pub fn max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles.max(1);
        self
    }

    pub fn build(self) -> Orchestrator {
        let host: Arc<dyn SourceHost> = match self.source_host {
            Some(host) => host,
            None => Arc::new(DisabledSourceHost),
        };
        let executor: Arc<dyn TestExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(CommandRunner::new(Default::default())),
        };
        let tracker: Arc<dyn IssueTracker> = match self.issue_tracker {
            Some(tracker) => tracker,
            None => Arc::new(DisabledIssueTracker::default()),
        };
        let policy: Arc<dyn DecisionPolicy> = match self.policy {
            Some(policy) => policy,
            None => Arc::new(RuleBasedPolicy),
        };

        let change = ChangeCollaborator::new(host);
        let issues = IssueSync::new(tracker, executor.command_name());
        let planner = Planner::new(policy, change.clone(), issues);
        info!(
            policy = planner.policy_name(),
            max_cycles = self.max_cycles,
            "Orchestrator ready"
        );

        Orchestrator {
            change,
            executor,
            planner,
            max_cycles: self.max_cycles,
        }
    }
}
