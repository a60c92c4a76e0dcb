//! Change Collaborator: commit/PR metadata and status comments.
//!
//! [`SourceHost`] is the seam to the source-hosting API. [`ChangeCollaborator`]
//! wraps it with the run-level rules: every call is best effort, failures are
//! logged and leave the matching Run State field untouched.

use std::sync::Arc;

use async_trait::async_trait;
use ciboss_remote::{GithubClient, RepoRef};
use tracing::{debug, error, info, warn};

use crate::domain::error::{CiError, Result};
use crate::domain::run_state::{Degradation, RunState, TestStatus};

/// Log excerpt included in a failed-run comment.
pub const COMMENT_LOG_CHARS: usize = 2_000;

/// Changed files listed in a status comment.
pub const COMMENT_FILE_PREVIEW: usize = 10;

// ---------------------------------------------------------------------------
// Collaborator trait
// ---------------------------------------------------------------------------

/// Source-hosting operations needed by a run.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Head commit SHA of a pull request.
    async fn pull_request_head(&self, repo: &RepoRef, number: u64) -> Result<String>;

    /// Paths changed by a pull request.
    async fn pull_request_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<String>>;

    /// Paths changed by a single commit.
    async fn commit_files(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>>;

    async fn commit_message(&self, repo: &RepoRef, sha: &str) -> Result<String>;

    async fn post_pr_comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()>;

    async fn post_commit_comment(&self, repo: &RepoRef, sha: &str, body: &str) -> Result<()>;
}

/// Stand-in used when no source-hosting credential is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSourceHost;

impl DisabledSourceHost {
    fn missing() -> CiError {
        CiError::ConfigurationMissing {
            integration: "github",
            key: "GITHUB_TOKEN",
        }
    }
}

#[async_trait]
impl SourceHost for DisabledSourceHost {
    async fn pull_request_head(&self, _repo: &RepoRef, _number: u64) -> Result<String> {
        Err(Self::missing())
    }

    async fn pull_request_files(&self, _repo: &RepoRef, _number: u64) -> Result<Vec<String>> {
        Err(Self::missing())
    }

    async fn commit_files(&self, _repo: &RepoRef, _sha: &str) -> Result<Vec<String>> {
        Err(Self::missing())
    }

    async fn commit_message(&self, _repo: &RepoRef, _sha: &str) -> Result<String> {
        Err(Self::missing())
    }

    async fn post_pr_comment(&self, _repo: &RepoRef, _number: u64, _body: &str) -> Result<()> {
        Err(Self::missing())
    }

    async fn post_commit_comment(&self, _repo: &RepoRef, _sha: &str, _body: &str) -> Result<()> {
        Err(Self::missing())
    }
}

#[async_trait]
impl SourceHost for GithubClient {
    async fn pull_request_head(&self, repo: &RepoRef, number: u64) -> Result<String> {
        let pr = self
            .pull_request(repo, number)
            .await
            .map_err(|e| CiError::upstream("github", e))?;
        Ok(pr.head.sha)
    }

    async fn pull_request_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<String>> {
        GithubClient::pull_request_files(self, repo, number)
            .await
            .map_err(|e| CiError::upstream("github", e))
    }

    async fn commit_files(&self, repo: &RepoRef, sha: &str) -> Result<Vec<String>> {
        let commit = self
            .commit(repo, sha)
            .await
            .map_err(|e| CiError::upstream("github", e))?;
        Ok(commit.files.into_iter().map(|f| f.filename).collect())
    }

    async fn commit_message(&self, repo: &RepoRef, sha: &str) -> Result<String> {
        let commit = self
            .commit(repo, sha)
            .await
            .map_err(|e| CiError::upstream("github", e))?;
        Ok(commit.commit.message)
    }

    async fn post_pr_comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        self.create_issue_comment(repo, number, body)
            .await
            .map(|_| ())
            .map_err(|e| CiError::upstream("github", e))
    }

    async fn post_commit_comment(&self, repo: &RepoRef, sha: &str, body: &str) -> Result<()> {
        self.create_commit_comment(repo, sha, body)
            .await
            .map(|_| ())
            .map_err(|e| CiError::upstream("github", e))
    }
}

// ---------------------------------------------------------------------------
// Run-level adapter
// ---------------------------------------------------------------------------

/// Applies [`SourceHost`] results to a [`RunState`].
#[derive(Clone)]
pub struct ChangeCollaborator {
    host: Arc<dyn SourceHost>,
}

impl ChangeCollaborator {
    pub fn new(host: Arc<dyn SourceHost>) -> Self {
        Self { host }
    }

    /// Everything the `github` node does: resolve the commit, then fetch
    /// changed files and the commit message.
    pub async fn gather(&self, state: &mut RunState) {
        self.resolve_commit(state).await;
        self.fetch_changed_files(state).await;
        self.fetch_commit_message(state).await;
    }

    /// Fill `commit_sha` from the PR head when only a PR number is known.
    pub async fn resolve_commit(&self, state: &mut RunState) {
        if state.commit_sha().is_some() {
            return;
        }
        let Some(number) = state.pr_number else {
            return;
        };
        let head = self.host.pull_request_head(&state.repository, number).await;
        match head {
            Ok(sha) if !sha.trim().is_empty() => {
                info!(
                    run_id = %state.run_id,
                    pr = number,
                    sha = %sha,
                    "Resolved commit from pull request"
                );
                state.commit_sha = Some(sha.trim().to_string());
            }
            Ok(_) => warn!(run_id = %state.run_id, pr = number, "Pull request has no head SHA"),
            Err(e) => absorb(state, "resolve commit", e),
        }
    }

    /// Fetch the changed-file list once per run. Failures leave it empty.
    pub async fn fetch_changed_files(&self, state: &mut RunState) {
        if state.changed_files_fetched() {
            debug!(run_id = %state.run_id, "Changed files already known");
            return;
        }

        let files = match (state.pr_number, state.commit_sha().map(str::to_string)) {
            (Some(number), sha) => {
                let listed = self.host.pull_request_files(&state.repository, number).await;
                let files = match listed {
                    Ok(files) => files,
                    Err(e) => {
                        absorb(state, "fetch pull request files", e);
                        Vec::new()
                    }
                };
                match sha {
                    Some(sha) if files.is_empty() => self.commit_files_or_empty(state, &sha).await,
                    _ => files,
                }
            }
            (None, Some(sha)) => self.commit_files_or_empty(state, &sha).await,
            (None, None) => Vec::new(),
        };

        info!(run_id = %state.run_id, count = files.len(), "Changed files recorded");
        state.set_changed_files(files);
    }

    async fn commit_files_or_empty(&self, state: &mut RunState, sha: &str) -> Vec<String> {
        let listed = self.host.commit_files(&state.repository, sha).await;
        match listed {
            Ok(files) => files,
            Err(e) => {
                absorb(state, "fetch commit files", e);
                Vec::new()
            }
        }
    }

    /// Best effort: the message stays absent on any failure.
    pub async fn fetch_commit_message(&self, state: &mut RunState) {
        if state.commit_message.is_some() {
            return;
        }
        let Some(sha) = state.commit_sha().map(str::to_string) else {
            return;
        };
        let fetched = self.host.commit_message(&state.repository, &sha).await;
        match fetched {
            Ok(message) => state.set_commit_message(&message),
            Err(e) => absorb(state, "fetch commit message", e),
        }
    }

    /// Post `body` on the PR, or on the commit for commit-only runs.
    ///
    /// Returns whether the host accepted the comment; sets
    /// `state.comment_posted` on success.
    pub async fn post_comment(&self, state: &mut RunState, body: &str) -> bool {
        let result = if let Some(number) = state.pr_number {
            self.host
                .post_pr_comment(&state.repository, number, body)
                .await
        } else if let Some(sha) = state.commit_sha().map(str::to_string) {
            self.host
                .post_commit_comment(&state.repository, &sha, body)
                .await
        } else {
            info!(run_id = %state.run_id, "No pull request or commit to comment on, skipping");
            return false;
        };

        match result {
            Ok(()) => {
                info!(
                    run_id = %state.run_id,
                    repository = %state.repository,
                    "Posted status comment"
                );
                state.comment_posted = true;
                true
            }
            Err(e) => {
                absorb(state, "post comment", e);
                false
            }
        }
    }
}

/// Log a failed source-host call and note a disabled integration.
fn absorb(state: &mut RunState, operation: &str, err: CiError) {
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
        }
        other => {
            error!(run_id = %state.run_id, operation, error = %other, "Source host call failed")
        }
    }
}

// ---------------------------------------------------------------------------
// Comment rendering
// ---------------------------------------------------------------------------

/// Render the markdown status report posted at the end of a run.
pub fn render_status_comment(state: &RunState) -> String {
    let (marker, heading) = match state.test_status() {
        TestStatus::Passed => ("✅", "Tests Passed"),
        TestStatus::Failed => ("❌", "Tests Failed"),
        TestStatus::Pending => ("⏳", "Tests Pending"),
    };

    let mut lines = vec![
        format!("## {marker} CI Boss Report: {heading}"),
        String::new(),
        format!("**Commit:** `{}`", state.short_sha(8).unwrap_or("N/A")),
    ];

    if let Some(summary) = state.summary.as_deref().filter(|s| !s.is_empty()) {
        lines.extend([String::new(), "### Summary".to_string(), summary.to_string()]);
    }

    if let Some(issue) = state.tracked_issue() {
        let label = if issue.identifier.is_empty() {
            "Linear Issue"
        } else {
            issue.identifier.as_str()
        };
        lines.extend([
            String::new(),
            format!("📋 **Linked Linear Issue:** [{label}]({})", issue.url),
        ]);
    }

    if state.test_status() == TestStatus::Failed {
        if let Some(logs) = state.test_logs().filter(|l| !l.is_empty()) {
            lines.extend([
                String::new(),
                "<details>".to_string(),
                "<summary>Test Logs (click to expand)</summary>".to_string(),
                String::new(),
                "```".to_string(),
                excerpt(logs, COMMENT_LOG_CHARS),
                "```".to_string(),
                String::new(),
                "</details>".to_string(),
            ]);
        }
    }

    let files = state.changed_files();
    if !files.is_empty() {
        lines.extend([
            String::new(),
            format!("**Changed Files:** {} file(s)", files.len()),
        ]);
        if files.len() > COMMENT_FILE_PREVIEW {
            lines.push(format!(
                "  (showing first {COMMENT_FILE_PREVIEW} of {})",
                files.len()
            ));
        }
        lines.extend(
            files
                .iter()
                .take(COMMENT_FILE_PREVIEW)
                .map(|f| format!("  - `{f}`")),
        );
    }

    lines.extend([
        String::new(),
        "---".to_string(),
        "_Generated by CI Boss Agent_".to_string(),
    ]);
    lines.join("\n")
}

/// First `max_chars` characters, with a truncation note when cut.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::run_state::TrackedIssue;
    use crate::fakes::RecordingSourceHost;

    fn failed_state() -> RunState {
        let mut state = RunState::new("acme/widgets")
            .unwrap()
            .with_commit_sha("abc123def4567890");
        state.begin_test_cycle();
        state
            .finish_test_cycle(TestStatus::Failed, "1 failing".to_string())
            .unwrap();
        state
    }

    #[test]
    fn test_comment_for_failed_run() {
        let mut state = failed_state();
        state.summary = Some("Login test broke".to_string());
        state
            .attach_issue(TrackedIssue {
                id: "i-1".to_string(),
                identifier: "ENG-7".to_string(),
                url: "https://linear.app/acme/issue/ENG-7".to_string(),
            })
            .unwrap();

        let body = render_status_comment(&state);
        assert!(body.starts_with("## ❌ CI Boss Report: Tests Failed"));
        assert!(body.contains("**Commit:** `abc123de`"));
        assert!(body.contains("### Summary\nLogin test broke"));
        assert!(body.contains("[ENG-7](https://linear.app/acme/issue/ENG-7)"));
        assert!(body.contains("1 failing"));
        assert!(body.ends_with("_Generated by CI Boss Agent_"));
    }

    #[test]
    fn test_comment_for_passed_run_omits_logs() {
        let mut state = RunState::new("acme/widgets")
            .unwrap()
            .with_commit_sha("abc123");
        state.begin_test_cycle();
        state
            .finish_test_cycle(TestStatus::Passed, "all green".to_string())
            .unwrap();
        let body = render_status_comment(&state);
        assert!(body.contains("Tests Passed"));
        assert!(!body.contains("all green"));
    }

    #[test]
    fn test_comment_lists_first_ten_files() {
        let mut state = failed_state();
        state.set_changed_files((0..12).map(|i| format!("src/f{i}.rs")).collect());
        let body = render_status_comment(&state);
        assert!(body.contains("**Changed Files:** 12 file(s)"));
        assert!(body.contains("(showing first 10 of 12)"));
        assert!(body.contains("`src/f9.rs`"));
        assert!(!body.contains("`src/f10.rs`"));
    }

    #[test]
    fn test_excerpt_marks_truncation() {
        assert_eq!(excerpt("short", 10), "short");
        let cut = excerpt(&"x".repeat(30), 10);
        assert!(cut.starts_with(&"x".repeat(10)));
        assert!(cut.ends_with("... (truncated)"));
    }

    #[tokio::test]
    async fn test_disabled_host_degrades_without_error() {
        let collaborator = ChangeCollaborator::new(Arc::new(DisabledSourceHost));
        let mut state = RunState::new("acme/widgets").unwrap().with_pr_number(42);

        collaborator.gather(&mut state).await;

        assert!(state.commit_sha().is_none());
        assert!(state.changed_files().is_empty());
        assert!(state.changed_files_fetched());
        assert_eq!(
            state.degraded(),
            [Degradation::IntegrationDisabled {
                integration: "github".to_string()
            }]
        );
        assert!(!collaborator.post_comment(&mut state, "body").await);
        assert!(!state.comment_posted);
    }

    #[tokio::test]
    async fn test_pr_file_failure_falls_back_to_commit_files() {
        let host = Arc::new(
            RecordingSourceHost::new()
                .failing_pr_files()
                .with_commit_files(&["web/cart.ts"]),
        );
        let collaborator = ChangeCollaborator::new(host.clone());
        let mut state = RunState::new("acme/widgets")
            .unwrap()
            .with_pr_number(42)
            .with_commit_sha("abc123");

        collaborator.fetch_changed_files(&mut state).await;

        assert_eq!(state.changed_files(), ["web/cart.ts".to_string()]);
        assert_eq!(host.file_fetches(), 2);
    }
}
