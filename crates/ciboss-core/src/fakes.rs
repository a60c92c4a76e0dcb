//! In-memory fakes for the collaborator traits (testing only)
//!
//! `RecordingSourceHost`, `RecordingIssueTracker`, `ScriptedTestExecutor` and
//! `FixedPolicy` satisfy the trait contracts without network or subprocess
//! access and record every call for assertions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ciboss_ci::TestReport;
use ciboss_remote::RepoRef;

use crate::change::SourceHost;
use crate::domain::error::{CiError, Result};
use crate::domain::run_state::{NextAction, RunState, TrackedIssue};
use crate::executor::TestExecutor;
use crate::issues::{IssueDraft, IssueTracker};
use crate::policy::{Decision, DecisionPolicy};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn upstream(service: &'static str, message: &str) -> CiError {
    CiError::UpstreamApi {
        service,
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// RecordingSourceHost
// ---------------------------------------------------------------------------

/// Where a comment was posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    PullRequest(u64),
    Commit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedComment {
    pub repository: String,
    pub target: CommentTarget,
    pub body: String,
}

/// Source host answering from fixed data.
#[derive(Debug, Default)]
pub struct RecordingSourceHost {
    head_sha: Option<String>,
    pr_files: Vec<String>,
    commit_files: Vec<String>,
    commit_message: Option<String>,
    fail_reads: bool,
    fail_pr_files: bool,
    fail_comments: bool,
    file_fetches: AtomicU32,
    comments: Mutex<Vec<RecordedComment>>,
}

impl RecordingSourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head_sha(mut self, sha: &str) -> Self {
        self.head_sha = Some(sha.to_string());
        self
    }

    pub fn with_pr_files(mut self, files: &[&str]) -> Self {
        self.pr_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_commit_files(mut self, files: &[&str]) -> Self {
        self.commit_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_commit_message(mut self, message: &str) -> Self {
        self.commit_message = Some(message.to_string());
        self
    }

    /// Every read fails with an upstream error.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Only the PR file listing fails.
    pub fn failing_pr_files(mut self) -> Self {
        self.fail_pr_files = true;
        self
    }

    /// Every comment fails with an upstream error.
    pub fn failing_comments(mut self) -> Self {
        self.fail_comments = true;
        self
    }

    pub fn comments(&self) -> Vec<RecordedComment> {
        lock(&self.comments).clone()
    }

    /// Number of changed-file list requests (PR or commit).
    pub fn file_fetches(&self) -> u32 {
        self.file_fetches.load(Ordering::SeqCst)
    }

    fn read<T: Clone>(&self, value: &T) -> Result<T> {
        if self.fail_reads {
            Err(upstream("github", "status 502: bad gateway"))
        } else {
            Ok(value.clone())
        }
    }

    fn record(&self, repo: &RepoRef, target: CommentTarget, body: &str) -> Result<()> {
        if self.fail_comments {
            return Err(upstream("github", "status 403: forbidden"));
        }
        lock(&self.comments).push(RecordedComment {
            repository: repo.full_name(),
            target,
            body: body.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl SourceHost for RecordingSourceHost {
    async fn pull_request_head(&self, _repo: &RepoRef, number: u64) -> Result<String> {
        match self.read(&self.head_sha)? {
            Some(sha) => Ok(sha),
            None => Err(upstream("github", &format!("pull request {number} not found"))),
        }
    }

    async fn pull_request_files(&self, _repo: &RepoRef, _number: u64) -> Result<Vec<String>> {
        self.file_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_pr_files {
            return Err(upstream("github", "status 500: server error"));
        }
        self.read(&self.pr_files)
    }

    async fn commit_files(&self, _repo: &RepoRef, _sha: &str) -> Result<Vec<String>> {
        self.file_fetches.fetch_add(1, Ordering::SeqCst);
        self.read(&self.commit_files)
    }

    async fn commit_message(&self, _repo: &RepoRef, sha: &str) -> Result<String> {
        match self.read(&self.commit_message)? {
            Some(message) => Ok(message),
            None => Err(upstream("github", &format!("commit {sha} not found"))),
        }
    }

    async fn post_pr_comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        self.record(repo, CommentTarget::PullRequest(number), body)
    }

    async fn post_commit_comment(&self, repo: &RepoRef, sha: &str, body: &str) -> Result<()> {
        self.record(repo, CommentTarget::Commit(sha.to_string()), body)
    }
}

// ---------------------------------------------------------------------------
// RecordingIssueTracker
// ---------------------------------------------------------------------------

/// Issue tracker that hands out sequential ids (`issue-1`, `CI-1`, ...).
#[derive(Debug, Default)]
pub struct RecordingIssueTracker {
    fail: bool,
    created: Mutex<Vec<IssueDraft>>,
    comments: Mutex<Vec<(String, String)>>,
    transitions: Mutex<Vec<(String, String)>>,
}

impl RecordingIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with an upstream error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<IssueDraft> {
        lock(&self.created).clone()
    }

    /// `(issue_id, body)` pairs.
    pub fn comments(&self) -> Vec<(String, String)> {
        lock(&self.comments).clone()
    }

    /// `(issue_id, state_name)` pairs.
    pub fn transitions(&self) -> Vec<(String, String)> {
        lock(&self.transitions).clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(upstream("linear", "GraphQL error: authentication required"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IssueTracker for RecordingIssueTracker {
    async fn create_issue(&self, draft: &IssueDraft) -> Result<TrackedIssue> {
        self.check()?;
        let mut created = lock(&self.created);
        created.push(draft.clone());
        let n = created.len();
        Ok(TrackedIssue {
            id: format!("issue-{n}"),
            identifier: format!("CI-{n}"),
            url: format!("https://linear.app/ciboss/issue/CI-{n}"),
        })
    }

    async fn comment_on_issue(&self, issue_id: &str, body: &str) -> Result<()> {
        self.check()?;
        lock(&self.comments).push((issue_id.to_string(), body.to_string()));
        Ok(())
    }

    async fn transition_issue(&self, issue_id: &str, state_name: &str) -> Result<()> {
        self.check()?;
        lock(&self.transitions).push((issue_id.to_string(), state_name.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTestExecutor
// ---------------------------------------------------------------------------

/// Test executor replaying `(exit_code, output)` pairs; the last pair repeats.
#[derive(Debug)]
pub struct ScriptedTestExecutor {
    script: Vec<(i32, String)>,
    calls: AtomicU32,
}

impl ScriptedTestExecutor {
    pub fn always(exit_code: i32, output: &str) -> Self {
        Self::sequence(vec![(exit_code, output)])
    }

    pub fn sequence(script: Vec<(i32, &str)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(code, output)| (code, output.to_string()))
                .collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestExecutor for ScriptedTestExecutor {
    fn command_name(&self) -> &str {
        ciboss_ci::DEFAULT_COMMAND_NAME
    }

    async fn execute(&self, _state: &RunState) -> TestReport {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        match self.script.get(call).or_else(|| self.script.last()) {
            Some((code, output)) => TestReport::from_exit(self.command_name(), *code, output),
            None => TestReport::from_exit(self.command_name(), 0, ""),
        }
    }
}

// ---------------------------------------------------------------------------
// FixedPolicy
// ---------------------------------------------------------------------------

/// Policy that always returns the same action, or always fails.
#[derive(Debug)]
pub struct FixedPolicy {
    action: Option<NextAction>,
    decisions: AtomicU32,
}

impl FixedPolicy {
    pub fn always(action: NextAction) -> Self {
        Self {
            action: Some(action),
            decisions: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            action: None,
            decisions: AtomicU32::new(0),
        }
    }

    pub fn decisions(&self) -> u32 {
        self.decisions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionPolicy for FixedPolicy {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn decide(&self, _state: &RunState) -> Result<Decision> {
        self.decisions.fetch_add(1, Ordering::SeqCst);
        match self.action {
            Some(action) => Ok(Decision::new(action, "fixed policy")),
            None => Err(CiError::Policy("model unavailable".to_string())),
        }
    }
}
