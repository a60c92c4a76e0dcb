//! ciboss core library
//!
//! The CI orchestration workflow: gather change metadata, let a planner pick
//! the next action, run the test suite, track failures as issues and report
//! back on the change.
//!
//! Components, leaves first:
//! - [`RunState`]: the typed record threaded through one run
//! - [`ChangeCollaborator`] over a [`SourceHost`] (GitHub)
//! - [`TestExecutor`] (subprocess runner from `ciboss-ci`)
//! - [`IssueSync`] over an [`IssueTracker`] (Linear)
//! - [`Planner`] over a pluggable [`DecisionPolicy`]
//! - [`Orchestrator`]: the bounded state machine tying them together

pub mod change;
pub mod config;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod issues;
pub mod obs;
pub mod orchestrator;
pub mod planner;
pub mod policy;
pub mod telemetry;

pub use change::{render_status_comment, ChangeCollaborator, DisabledSourceHost, SourceHost};
pub use config::{CiBossConfig, ConfigReport, Integration, DEFAULT_MAX_CYCLES};
pub use domain::{
    CiError, Degradation, NextAction, Result, RunInput, RunState, TestStatus, TrackedIssue,
    MAX_COMMIT_MESSAGE_CHARS,
};
pub use executor::{run_test_cycle, TestExecutor};
pub use issues::{
    failure_fingerprint, issue_description, issue_title, DisabledIssueTracker, IssueDraft,
    IssueSync, IssueSyncOutcome, IssueTracker,
};
pub use orchestrator::{route, Node, Orchestrator, OrchestratorBuilder, RunReport, Transition};
pub use planner::{Planner, DEGRADED_MARKER};
pub use policy::{canonical_action, ChatPolicy, Decision, DecisionPolicy, RuleBasedPolicy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
