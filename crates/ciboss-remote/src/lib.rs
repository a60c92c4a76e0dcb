//! ciboss-remote: remote service clients for ciboss
//!
//! One client per external system, each a thin typed wrapper over `reqwest`:
//!
//! - [`GithubClient`]: pull request / commit metadata and comment posting
//! - [`LinearClient`]: issue creation, comments and workflow transitions
//! - [`ChatClient`]: OpenAI-compatible chat completions for the planner
//!
//! Every call is a single attempt. Callers decide how to degrade on failure.

pub mod chat;
pub mod error;
pub mod github;
pub mod linear;
pub mod repo;

pub use chat::{ChatClient, ChatConfig};
pub use error::RemoteError;
pub use github::{CommitDetails, GithubClient, GithubConfig, PullRequest};
pub use linear::{IssueCreateInput, LinearClient, LinearConfig, LinearIssue};
pub use repo::RepoRef;

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Per-request timeout applied to every client.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("ciboss/", env!("CARGO_PKG_VERSION"));

/// Keep error bodies short enough to log without flooding.
pub(crate) fn truncate_for_error(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Mask a secret for `Debug` output.
pub(crate) fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
