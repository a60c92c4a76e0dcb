//! GitHub REST client
//!
//! Covers the five calls a CI run needs: pull request head, pull request
//! files, commit details (message + files), and comment creation on a pull
//! request or a commit.

use crate::error::RemoteError;
use crate::repo::RepoRef;
use crate::{redact, truncate_for_error, Result, REQUEST_TIMEOUT_SECS, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default public API base URL
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

const SERVICE: &str = "github";
const FILES_PER_PAGE: usize = 100;
const MAX_FILE_PAGES: u32 = 10;

/// GitHub configuration
#[derive(Clone)]
pub struct GithubConfig {
    /// Personal access token with `repo` scope
    pub token: String,
    /// API base URL (override for GitHub Enterprise or tests)
    pub api_base: String,
}

impl GithubConfig {
    pub fn new(token: &str) -> Self {
        GithubConfig {
            token: token.to_string(),
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API base
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }
}

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &redact(&self.token))
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Subset of a pull request payload
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
}

/// Subset of a commit payload
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetails {
    pub sha: String,
    pub commit: CommitBody,
    #[serde(default)]
    pub files: Vec<ChangedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
}

/// Response to a comment creation
#[derive(Debug, Clone, Deserialize)]
pub struct CommentCreated {
    pub id: u64,
    pub html_url: Option<String>,
}

/// GitHub REST client
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubClient {
    /// Create a new client with auth and API-version headers preset
    pub fn new(config: GithubConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let bearer = format!("Bearer {}", config.token.trim());
        let mut auth = reqwest::header::HeaderValue::from_str(&bearer)
            .map_err(|_| RemoteError::ClientSetup("invalid authorization header".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteError::ClientSetup(e.to_string()))?;

        Ok(GithubClient {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch pull request details
    pub async fn pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequest> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, repo.owner, repo.name, number
        );
        self.request_json("fetch pull request", self.http.get(url))
            .await
    }

    /// Fetch the file list of a pull request (up to 1000 files)
    pub async fn pull_request_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/files",
            self.api_base, repo.owner, repo.name, number
        );
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let chunk: Vec<ChangedFile> = self
                .request_json(
                    "fetch pull request files",
                    self.http.get(&url).query(&[
                        ("per_page", FILES_PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ]),
                )
                .await?;
            let chunk_len = chunk.len();
            files.extend(chunk.into_iter().map(|f| f.filename));
            if chunk_len < FILES_PER_PAGE {
                break;
            }
        }
        Ok(files)
    }

    /// Fetch commit details, including message and changed files
    pub async fn commit(&self, repo: &RepoRef, sha: &str) -> Result<CommitDetails> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base, repo.owner, repo.name, sha
        );
        self.request_json("fetch commit", self.http.get(url)).await
    }

    /// Post a comment on a pull request (via the issues endpoint)
    pub async fn create_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<CommentCreated> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, repo.owner, repo.name, number
        );
        self.request_json(
            "create pull request comment",
            self.http.post(url).json(&json!({ "body": body })),
        )
        .await
    }

    /// Post a comment on a commit
    pub async fn create_commit_comment(
        &self,
        repo: &RepoRef,
        sha: &str,
        body: &str,
    ) -> Result<CommentCreated> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}/comments",
            self.api_base, repo.owner, repo.name, sha
        );
        self.request_json(
            "create commit comment",
            self.http.post(url).json(&json!({ "body": body })),
        )
        .await
    }

    async fn request_json<T>(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!(operation, "GitHub request");
        let response = request.send().await.map_err(|e| RemoteError::Transport {
            service: SERVICE,
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                service: SERVICE,
                operation: operation.to_string(),
                status: status.as_u16(),
                body: truncate_for_error(&body, 200),
            });
        }

        response.json::<T>().await.map_err(|e| RemoteError::Decode {
            service: SERVICE,
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_public_api() {
        let config = GithubConfig::new("ghp_secret");
        assert_eq!(config.api_base, DEFAULT_GITHUB_API_BASE);
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config =
            GithubConfig::new("ghp_secret").with_api_base("https://ghe.example.com/api/v3");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("ghe.example.com"));
    }

    #[test]
    fn test_commit_payload_without_files() {
        let payload = r#"{"sha":"abc123","commit":{"message":"Fix bug"}}"#;
        let details: CommitDetails = serde_json::from_str(payload).unwrap();
        assert_eq!(details.commit.message, "Fix bug");
        assert!(details.files.is_empty());
    }
}
