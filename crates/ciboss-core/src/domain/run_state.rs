//! The mutable record threaded through one orchestration run.
//!
//! Fields whose transitions carry invariants (`test_status`, `test_logs`,
//! `changed_files`, `tracked_issue`) are private and change only through the
//! guarded mutators below.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ciboss_remote::RepoRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{CiError, Result};

/// Commit messages are stored truncated to this many characters.
pub const MAX_COMMIT_MESSAGE_CHARS: usize = 500;

/// Test outcome as seen by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next step chosen by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    RunTests,
    AnalyzeFailures,
    Summarize,
}

impl NextAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NextAction::RunTests => "run_tests",
            NextAction::AnalyzeFailures => "analyze_failures",
            NextAction::Summarize => "summarize",
        }
    }

    /// Terminal actions end the run after the planner's side effects.
    pub fn is_terminal(self) -> bool {
        !matches!(self, NextAction::RunTests)
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NextAction {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run_tests" => Ok(NextAction::RunTests),
            "analyze_failures" => Ok(NextAction::AnalyzeFailures),
            "summarize" => Ok(NextAction::Summarize),
            other => Err(CiError::Policy(format!("unknown action: {other}"))),
        }
    }
}

/// Handle to the issue opened for this run's failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIssue {
    /// Tracker-internal id used for API calls.
    pub id: String,
    /// Human-readable key (e.g. "ENG-123").
    pub identifier: String,
    pub url: String,
}

/// Why a run finished in degraded mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Degradation {
    /// An optional integration had no credentials.
    IntegrationDisabled { integration: String },
    /// No commit SHA could be resolved, so tests were never run.
    UnresolvedCommit,
    /// The planner kept asking for tests past the cycle limit.
    LoopBoundExceeded { max_cycles: u32 },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::IntegrationDisabled { integration } => {
                write!(f, "{integration} integration disabled")
            }
            Degradation::UnresolvedCommit => {
                f.write_str("commit SHA could not be resolved; tests were not run")
            }
            Degradation::LoopBoundExceeded { max_cycles } => write!(
                f,
                "test cycle limit of {max_cycles} reached without a final decision"
            ),
        }
    }
}

/// Caller-supplied record that starts a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    pub repository: String,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub changed_files: Option<Vec<String>>,
    /// A pre-seeded `passed` or `failed` skips the first test cycle, and
    /// together with `tracked_issue` a `passed` seed resolves that issue
    /// without running anything in this process.
    #[serde(default)]
    pub test_status: Option<TestStatus>,
    /// Issue opened by an earlier run for this change, so a recovery can
    /// close it.
    #[serde(default)]
    pub tracked_issue: Option<TrackedIssue>,
}

impl RunInput {
    pub fn for_pull_request(repository: &str, pr_number: u64) -> Self {
        Self {
            repository: repository.to_string(),
            pr_number: Some(pr_number),
            ..Self::default()
        }
    }

    pub fn for_commit(repository: &str, commit_sha: &str) -> Self {
        Self {
            repository: repository.to_string(),
            commit_sha: Some(commit_sha.to_string()),
            ..Self::default()
        }
    }
}

/// State of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub repository: RepoRef,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub pr_number: Option<u64>,
    changed_files: Vec<String>,
    #[serde(default)]
    changed_files_fetched: bool,
    test_status: TestStatus,
    test_logs: Option<String>,
    #[serde(default)]
    test_runs: u32,
    pub summary: Option<String>,
    pub next_action: Option<NextAction>,
    tracked_issue: Option<TrackedIssue>,
    #[serde(default)]
    pub comment_posted: bool,
    #[serde(default)]
    degraded: Vec<Degradation>,
}

impl RunState {
    /// Create a state for `repository` with nothing else known.
    pub fn new(repository: &str) -> Result<Self> {
        let repository = RepoRef::parse(repository)
            .map_err(|_| CiError::InvalidRepository(repository.to_string()))?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            repository,
            commit_sha: None,
            commit_message: None,
            pr_number: None,
            changed_files: Vec::new(),
            changed_files_fetched: false,
            test_status: TestStatus::Pending,
            test_logs: None,
            test_runs: 0,
            summary: None,
            next_action: None,
            tracked_issue: None,
            comment_posted: false,
            degraded: Vec::new(),
        })
    }

    /// Build a state from a caller input record.
    ///
    /// Requires a valid repository and at least one of `pr_number` or
    /// `commit_sha`. A non-empty pre-seeded `changed_files` counts as already
    /// fetched.
    pub fn from_input(input: RunInput) -> Result<Self> {
        let mut state = Self::new(&input.repository)?;
        let commit_sha = input.commit_sha.filter(|s| !s.trim().is_empty());
        if input.pr_number.is_none() && commit_sha.is_none() {
            return Err(CiError::InvalidInput(
                "either pr_number or commit_sha is required".to_string(),
            ));
        }
        state.pr_number = input.pr_number;
        state.commit_sha = commit_sha.map(|s| s.trim().to_string());
        if let Some(message) = input.commit_message {
            state.set_commit_message(&message);
        }
        if let Some(files) = input.changed_files.filter(|f| !f.is_empty()) {
            state.set_changed_files(files);
        }
        if let Some(status) = input.test_status {
            state.test_status = status;
        }
        state.tracked_issue = input.tracked_issue;
        Ok(state)
    }

    pub fn with_pr_number(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }

    pub fn with_commit_sha(mut self, commit_sha: &str) -> Self {
        self.commit_sha = Some(commit_sha.to_string());
        self
    }

    /// The commit SHA, if resolved and non-empty.
    pub fn commit_sha(&self) -> Option<&str> {
        self.commit_sha
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// First `len` characters of the commit SHA.
    pub fn short_sha(&self, len: usize) -> Option<&str> {
        self.commit_sha().map(|sha| match sha.char_indices().nth(len) {
            Some((idx, _)) => &sha[..idx],
            None => sha,
        })
    }

    pub fn set_commit_message(&mut self, message: &str) {
        let message = match message.char_indices().nth(MAX_COMMIT_MESSAGE_CHARS) {
            Some((idx, _)) => &message[..idx],
            None => message,
        };
        self.commit_message = Some(message.to_string());
    }

    pub fn changed_files(&self) -> &[String] {
        &self.changed_files
    }

    pub fn changed_files_fetched(&self) -> bool {
        self.changed_files_fetched
    }

    /// Store the changed-file list. Only the first call per run takes effect;
    /// returns `false` when the list was already set.
    pub fn set_changed_files(&mut self, files: Vec<String>) -> bool {
        if self.changed_files_fetched {
            return false;
        }
        self.changed_files = files;
        self.changed_files_fetched = true;
        true
    }

    pub fn test_status(&self) -> TestStatus {
        self.test_status
    }

    pub fn test_logs(&self) -> Option<&str> {
        self.test_logs.as_deref()
    }

    /// Number of test executions started in this run.
    pub fn test_runs(&self) -> u32 {
        self.test_runs
    }

    /// Enter a new test cycle: status returns to `pending`.
    pub fn begin_test_cycle(&mut self) {
        self.test_status = TestStatus::Pending;
        self.test_runs += 1;
    }

    /// Record the result of the test cycle started by [`begin_test_cycle`].
    ///
    /// [`begin_test_cycle`]: RunState::begin_test_cycle
    pub fn finish_test_cycle(&mut self, status: TestStatus, logs: String) -> Result<()> {
        if status == TestStatus::Pending {
            return Err(CiError::InvalidTransition(
                "a test cycle cannot finish as pending".to_string(),
            ));
        }
        if self.test_status != TestStatus::Pending || self.test_runs == 0 {
            return Err(CiError::InvalidTransition(format!(
                "test status {} -> {} without a test execution",
                self.test_status, status
            )));
        }
        self.test_status = status;
        self.test_logs = Some(logs);
        Ok(())
    }

    pub fn tracked_issue(&self) -> Option<&TrackedIssue> {
        self.tracked_issue.as_ref()
    }

    pub fn tracked_issue_id(&self) -> Option<&str> {
        self.tracked_issue.as_ref().map(|i| i.id.as_str())
    }

    /// Record the issue created for this run. Set at most once.
    pub fn attach_issue(&mut self, issue: TrackedIssue) -> Result<()> {
        if let Some(existing) = &self.tracked_issue {
            return Err(CiError::InvalidTransition(format!(
                "issue {} is already tracked for this run",
                existing.identifier
            )));
        }
        self.tracked_issue = Some(issue);
        Ok(())
    }

    pub fn degraded(&self) -> &[Degradation] {
        &self.degraded
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Record a degradation reason (duplicates are ignored).
    pub fn mark_degraded(&mut self, reason: Degradation) {
        if !self.degraded.contains(&reason) {
            self.degraded.push(reason);
        }
    }
}
