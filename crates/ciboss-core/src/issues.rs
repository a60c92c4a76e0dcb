//! Issue Tracker: one tracked issue per failing run.
//!
//! Whether to create, comment or resolve is decided from Run State alone
//! (`tracked_issue`), never by querying the tracker, so re-running the
//! planner within a run cannot open a second issue.

use std::sync::Arc;

use async_trait::async_trait;
use ciboss_remote::{IssueCreateInput, LinearClient};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::change::excerpt;
use crate::domain::error::{CiError, Result};
use crate::domain::run_state::{Degradation, RunState, TestStatus, TrackedIssue};

/// Linear's numeric value for "Medium".
pub const MEDIUM_PRIORITY: u8 = 2;

/// Cap on the issue description.
pub const MAX_DESCRIPTION_CHARS: usize = 10_000;

/// Changed files listed in an issue description.
pub const DESCRIPTION_FILE_LIMIT: usize = 20;

/// Log excerpt used in issue comments.
pub const COMMENT_LOG_CHARS: usize = 2_000;

/// Workflow state an issue moves to once tests pass again.
pub const DONE_STATE: &str = "Done";

/// Prefix of the line that identifies a failure across runs.
pub const FINGERPRINT_PREFIX: &str = "ciboss-fingerprint: ";

/// Fields of an issue to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    pub priority: u8,
}

/// Issue-tracking operations needed by a run.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, draft: &IssueDraft) -> Result<TrackedIssue>;

    async fn comment_on_issue(&self, issue_id: &str, body: &str) -> Result<()>;

    /// Move the issue to the workflow state called `state_name`.
    async fn transition_issue(&self, issue_id: &str, state_name: &str) -> Result<()>;
}

/// Stand-in used when the tracker credential or team id is missing.
#[derive(Debug, Clone, Copy)]
pub struct DisabledIssueTracker {
    key: &'static str,
}

impl DisabledIssueTracker {
    /// `key` names the missing setting, e.g. `LINEAR_API_KEY`.
    pub fn missing(key: &'static str) -> Self {
        Self { key }
    }

    fn error(&self) -> CiError {
        CiError::ConfigurationMissing {
            integration: "linear",
            key: self.key,
        }
    }
}

impl Default for DisabledIssueTracker {
    fn default() -> Self {
        Self::missing("LINEAR_API_KEY")
    }
}

#[async_trait]
impl IssueTracker for DisabledIssueTracker {
    async fn create_issue(&self, _draft: &IssueDraft) -> Result<TrackedIssue> {
        Err(self.error())
    }

    async fn comment_on_issue(&self, _issue_id: &str, _body: &str) -> Result<()> {
        Err(self.error())
    }

    async fn transition_issue(&self, _issue_id: &str, _state_name: &str) -> Result<()> {
        Err(self.error())
    }
}

#[async_trait]
impl IssueTracker for LinearClient {
    async fn create_issue(&self, draft: &IssueDraft) -> Result<TrackedIssue> {
        let input = IssueCreateInput {
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority,
        };
        let issue = LinearClient::create_issue(self, &input)
            .await
            .map_err(|e| CiError::upstream("linear", e))?;
        Ok(TrackedIssue {
            id: issue.id,
            identifier: issue.identifier,
            url: issue.url,
        })
    }

    async fn comment_on_issue(&self, issue_id: &str, body: &str) -> Result<()> {
        self.create_comment(issue_id, body)
            .await
            .map_err(|e| CiError::upstream("linear", e))
    }

    async fn transition_issue(&self, issue_id: &str, state_name: &str) -> Result<()> {
        LinearClient::transition_issue(self, issue_id, state_name)
            .await
            .map_err(|e| CiError::upstream("linear", e))
    }
}

/// What an [`IssueSync`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueSyncOutcome {
    /// Nothing applied to the current status.
    Skipped,
    Created(TrackedIssue),
    /// A failure-update comment was added to the tracked issue.
    Updated,
    /// Recovery comment added and the issue moved to Done.
    Resolved,
    /// The tracker is not configured.
    Disabled,
    /// The tracker call failed; logged and ignored.
    Failed,
}

/// Applies the create / update / resolve rules against an [`IssueTracker`].
#[derive(Clone)]
pub struct IssueSync {
    tracker: Arc<dyn IssueTracker>,
    command_name: String,
}

impl IssueSync {
    pub fn new(tracker: Arc<dyn IssueTracker>, command_name: impl Into<String>) -> Self {
        Self {
            tracker,
            command_name: command_name.into(),
        }
    }

    /// Record a failed test run: create the issue, or comment on the one
    /// already tracked.
    pub async fn record_failure(&self, state: &mut RunState) -> IssueSyncOutcome {
        if state.test_status() != TestStatus::Failed {
            return IssueSyncOutcome::Skipped;
        }
        if state.commit_sha().is_none() {
            warn!(run_id = %state.run_id, "No commit SHA, not tracking failure");
            return IssueSyncOutcome::Skipped;
        }

        if let Some(issue_id) = state.tracked_issue_id().map(str::to_string) {
            let body = failure_update_comment(state);
            let sent = self.tracker.comment_on_issue(&issue_id, &body).await;
            return match sent {
                Ok(()) => {
                    info!(
                        run_id = %state.run_id,
                        issue_id = %issue_id,
                        "Added failure update to tracked issue"
                    );
                    IssueSyncOutcome::Updated
                }
                Err(e) => absorb(state, "comment on issue", e),
            };
        }

        let draft = IssueDraft {
            title: issue_title(&self.command_name, state),
            description: issue_description(state),
            priority: MEDIUM_PRIORITY,
        };
        let created = self.tracker.create_issue(&draft).await;
        match created {
            Ok(issue) => {
                info!(
                    run_id = %state.run_id,
                    issue = %issue.identifier,
                    url = %issue.url,
                    "Created tracked issue"
                );
                if let Err(e) = state.attach_issue(issue.clone()) {
                    error!(run_id = %state.run_id, error = %e, "Tracked issue already set");
                    return IssueSyncOutcome::Failed;
                }
                IssueSyncOutcome::Created(issue)
            }
            Err(e) => absorb(state, "create issue", e),
        }
    }

    /// Tests pass again: comment on the tracked issue and move it to Done.
    /// The issue stays in Run State as history.
    pub async fn record_recovery(&self, state: &mut RunState) -> IssueSyncOutcome {
        if state.test_status() != TestStatus::Passed {
            return IssueSyncOutcome::Skipped;
        }
        let Some(issue_id) = state.tracked_issue_id().map(str::to_string) else {
            return IssueSyncOutcome::Skipped;
        };

        let body = recovery_comment(state);
        let sent = self.tracker.comment_on_issue(&issue_id, &body).await;
        if let Err(e) = sent {
            return absorb(state, "comment on issue", e);
        }
        let moved = self.tracker.transition_issue(&issue_id, DONE_STATE).await;
        match moved {
            Ok(()) => {
                info!(run_id = %state.run_id, issue_id = %issue_id, "Tracked issue resolved");
                IssueSyncOutcome::Resolved
            }
            Err(e) => absorb(state, "transition issue", e),
        }
    }
}

fn absorb(state: &mut RunState, operation: &str, err: CiError) -> IssueSyncOutcome {
    match err {
        CiError::ConfigurationMissing { integration, key } => {
            warn!(
                run_id = %state.run_id,
                integration,
                key,
                operation,
                "Integration not configured, skipping"
            );
            state.mark_degraded(Degradation::IntegrationDisabled {
                integration: integration.to_string(),
            });
            IssueSyncOutcome::Disabled
        }
        other => {
            error!(run_id = %state.run_id, operation, error = %other, "Issue tracker call failed");
            IssueSyncOutcome::Failed
        }
    }
}

/// `[CI] <command> failure on <owner/name>@<sha7>`
pub fn issue_title(command_name: &str, state: &RunState) -> String {
    format!(
        "[CI] {command_name} failure on {}@{}",
        state.repository,
        state.short_sha(7).unwrap_or("unknown")
    )
}

/// Stable identifier for "this repository at this commit".
pub fn failure_fingerprint(state: &RunState) -> String {
    let key = format!(
        "{}@{}",
        state.repository,
        state.commit_sha().unwrap_or_default()
    );
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Markdown issue body, capped at [`MAX_DESCRIPTION_CHARS`].
pub fn issue_description(state: &RunState) -> String {
    let mut lines = vec![
        "## CI/CD Test Failure Details".to_string(),
        String::new(),
        format!("**Repository:** {}", state.repository),
        format!("**Commit:** `{}`", state.commit_sha().unwrap_or("N/A")),
    ];
    if let Some(number) = state.pr_number {
        lines.push(format!("**Pull Request:** #{number}"));
    }

    if let Some(summary) = state.summary.as_deref().filter(|s| !s.is_empty()) {
        lines.extend([String::new(), "### Summary".to_string(), summary.to_string()]);
    }

    let files = state.changed_files();
    if !files.is_empty() {
        lines.extend([
            String::new(),
            format!("### Changed Files ({} total)", files.len()),
        ]);
        lines.extend(
            files
                .iter()
                .take(DESCRIPTION_FILE_LIMIT)
                .map(|f| format!("- `{f}`")),
        );
        if files.len() > DESCRIPTION_FILE_LIMIT {
            lines.push(format!(
                "- ... and {} more files",
                files.len() - DESCRIPTION_FILE_LIMIT
            ));
        }
    }

    let footer = format!("\n\n---\n{FINGERPRINT_PREFIX}{}", failure_fingerprint(state));
    let head = lines.join("\n");

    let mut body = head.clone();
    if let Some(logs) = state.test_logs().filter(|l| !l.is_empty()) {
        // Leave room for the fences, the truncation note and the footer.
        let used = head.chars().count() + footer.chars().count() + 64;
        let budget = MAX_DESCRIPTION_CHARS.saturating_sub(used);
        if budget > 0 {
            body.push_str("\n\n### Test Logs\n```\n");
            body.push_str(&excerpt(logs, budget));
            body.push_str("\n```");
        }
    }

    let room = MAX_DESCRIPTION_CHARS.saturating_sub(footer.chars().count());
    if body.chars().count() > room {
        body = ciboss_ci::truncate_chars(&body, room.saturating_sub(20));
        body.push_str("\n\n... (truncated)");
    }
    body.push_str(&footer);
    body
}

fn failure_update_comment(state: &RunState) -> String {
    format!(
        "## ❌ Test Failure Update\n\n**Commit:** `{}`\n\n\
         ### Summary\n{}\n\n### Test Logs\n```\n{}\n```",
        state.commit_sha().unwrap_or("N/A"),
        state.summary.as_deref().unwrap_or("No summary available"),
        excerpt(state.test_logs().unwrap_or_default(), COMMENT_LOG_CHARS),
    )
}

fn recovery_comment(state: &RunState) -> String {
    format!(
        "## ✅ Tests Now Passing\n\n**Commit:** `{}`\n\n\
         The tests that previously failed are now passing.",
        state.commit_sha().unwrap_or("N/A"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fakes::RecordingIssueTracker;

    fn failed_state(logs: &str) -> RunState {
        let mut state = RunState::new("acme/widgets")
            .unwrap()
            .with_commit_sha("abc123def456");
        state.begin_test_cycle();
        state
            .finish_test_cycle(TestStatus::Failed, logs.to_string())
            .unwrap();
        state
    }

    #[test]
    fn test_title_uses_short_sha() {
        let state = failed_state("boom");
        assert_eq!(
            issue_title("Playwright", &state),
            "[CI] Playwright failure on acme/widgets@abc123d"
        );
    }

    #[test]
    fn test_fingerprint_is_stable_per_commit() {
        let a = failed_state("one");
        let b = failed_state("two");
        assert_eq!(failure_fingerprint(&a), failure_fingerprint(&b));
        assert_eq!(failure_fingerprint(&a).len(), 64);

        let other = RunState::new("acme/widgets")
            .unwrap()
            .with_commit_sha("fff000");
        assert_ne!(failure_fingerprint(&a), failure_fingerprint(&other));
    }

    #[test]
    fn test_description_capped_and_keeps_fingerprint() {
        let mut state = failed_state(&"e".repeat(30_000));
        state.set_changed_files((0..25).map(|i| format!("tests/spec{i}.ts")).collect());
        state.pr_number = Some(42);

        let description = issue_description(&state);
        assert!(description.chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(description.contains("**Pull Request:** #42"));
        assert!(description.contains("### Changed Files (25 total)"));
        assert!(description.contains("- ... and 5 more files"));
        assert!(description.ends_with(&failure_fingerprint(&state)));
    }

    #[tokio::test]
    async fn test_failure_creates_once_then_updates() {
        let tracker = Arc::new(RecordingIssueTracker::default());
        let sync = IssueSync::new(tracker.clone(), "Playwright");
        let mut state = failed_state("1 failing");

        let first = sync.record_failure(&mut state).await;
        assert!(matches!(first, IssueSyncOutcome::Created(_)));
        let id = state.tracked_issue_id().map(str::to_string);

        let second = sync.record_failure(&mut state).await;
        assert_eq!(second, IssueSyncOutcome::Updated);
        assert_eq!(state.tracked_issue_id().map(str::to_string), id);
        assert_eq!(tracker.created().len(), 1);
        assert_eq!(tracker.comments().len(), 1);
        assert!(tracker.comments()[0].1.contains("Test Failure Update"));
    }

    #[tokio::test]
    async fn test_recovery_comments_and_transitions() {
        let tracker = Arc::new(RecordingIssueTracker::default());
        let sync = IssueSync::new(tracker.clone(), "Playwright");
        let mut state = failed_state("1 failing");
        sync.record_failure(&mut state).await;
        let id = state.tracked_issue_id().unwrap().to_string();

        state.begin_test_cycle();
        state
            .finish_test_cycle(TestStatus::Passed, "ok".to_string())
            .unwrap();
        assert_eq!(sync.record_recovery(&mut state).await, IssueSyncOutcome::Resolved);

        assert_eq!(state.tracked_issue_id(), Some(id.as_str()));
        assert_eq!(tracker.transitions(), vec![(id, DONE_STATE.to_string())]);
    }

    #[tokio::test]
    async fn test_disabled_tracker_marks_degraded() {
        let sync = IssueSync::new(Arc::new(DisabledIssueTracker::default()), "Playwright");
        let mut state = failed_state("1 failing");
        assert_eq!(sync.record_failure(&mut state).await, IssueSyncOutcome::Disabled);
        assert!(state.tracked_issue().is_none());
        assert!(state.is_degraded());
    }

    #[tokio::test]
    async fn test_passed_without_issue_is_noop() {
        let tracker = Arc::new(RecordingIssueTracker::default());
        let sync = IssueSync::new(tracker.clone(), "Playwright");
        let mut state = RunState::new("acme/widgets")
            .unwrap()
            .with_commit_sha("abc123");
        state.begin_test_cycle();
        state
            .finish_test_cycle(TestStatus::Passed, String::new())
            .unwrap();
        assert_eq!(sync.record_recovery(&mut state).await, IssueSyncOutcome::Skipped);
        assert_eq!(sync.record_failure(&mut state).await, IssueSyncOutcome::Skipped);
        assert!(tracker.created().is_empty());
    }
}
