//! Linear GraphQL client
//!
//! Issue creation, comments, and workflow state transitions against a single
//! configured team.

use crate::error::RemoteError;
use crate::{redact, truncate_for_error, Result, REQUEST_TIMEOUT_SECS, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Public GraphQL endpoint
pub const DEFAULT_LINEAR_API_URL: &str = "https://api.linear.app/graphql";

const SERVICE: &str = "linear";

const ISSUE_CREATE: &str = r#"
mutation CreateIssue($input: IssueCreateInput!) {
    issueCreate(input: $input) {
        success
        issue { id identifier url }
    }
}"#;

const COMMENT_CREATE: &str = r#"
mutation CreateComment($input: CommentCreateInput!) {
    commentCreate(input: $input) { success }
}"#;

const TEAM_STATES: &str = r#"
query GetWorkflowStates($teamId: String!) {
    team(id: $teamId) {
        states { nodes { id name } }
    }
}"#;

const ISSUE_UPDATE: &str = r#"
mutation UpdateIssue($id: String!, $input: IssueUpdateInput!) {
    issueUpdate(id: $id, input: $input) { success }
}"#;

/// Linear configuration
#[derive(Clone)]
pub struct LinearConfig {
    /// Personal API key, sent verbatim in `Authorization`
    pub api_key: String,
    /// Team that owns created issues
    pub team_id: String,
    /// Labels attached to every created issue
    pub label_ids: Vec<String>,
    /// GraphQL endpoint
    pub api_url: String,
}

impl LinearConfig {
    pub fn new(api_key: &str, team_id: &str) -> Self {
        LinearConfig {
            api_key: api_key.to_string(),
            team_id: team_id.to_string(),
            label_ids: Vec::new(),
            api_url: DEFAULT_LINEAR_API_URL.to_string(),
        }
    }

    /// Attach label ids to created issues
    pub fn with_labels(mut self, label_ids: Vec<String>) -> Self {
        self.label_ids = label_ids;
        self
    }

    /// Point the client at a different endpoint
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }
}

impl fmt::Debug for LinearConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearConfig")
            .field("api_key", &redact(&self.api_key))
            .field("team_id", &self.team_id)
            .field("label_ids", &self.label_ids)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Issue creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCreateInput {
    pub title: String,
    pub description: String,
    /// Numeric Linear priority (0 means none)
    pub priority: u8,
}

/// Created issue handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearIssue {
    pub id: String,
    pub identifier: String,
    pub url: String,
}

#[derive(Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssueCreatePayload,
}

#[derive(Deserialize)]
struct IssueCreatePayload {
    success: bool,
    issue: Option<LinearIssue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentCreateData {
    comment_create: SuccessPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdateData {
    issue_update: SuccessPayload,
}

#[derive(Deserialize)]
struct SuccessPayload {
    success: bool,
}

#[derive(Deserialize)]
struct TeamStatesData {
    team: Option<TeamStates>,
}

#[derive(Deserialize)]
struct TeamStates {
    states: StateConnection,
}

#[derive(Deserialize)]
struct StateConnection {
    nodes: Vec<WorkflowState>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkflowState {
    id: String,
    name: String,
}

/// Linear GraphQL client
#[derive(Clone)]
pub struct LinearClient {
    config: LinearConfig,
    http: reqwest::Client,
}

impl LinearClient {
    /// Create a new Linear client
    pub fn new(config: LinearConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteError::ClientSetup(e.to_string()))?;
        Ok(LinearClient { config, http })
    }

    /// Create an issue in the configured team
    pub async fn create_issue(&self, input: &IssueCreateInput) -> Result<LinearIssue> {
        let mut payload = json!({
            "teamId": self.config.team_id,
            "title": input.title,
            "description": input.description,
            "priority": input.priority,
        });
        if !self.config.label_ids.is_empty() {
            payload["labelIds"] = json!(self.config.label_ids);
        }

        let data: IssueCreateData = self
            .graphql("issueCreate", ISSUE_CREATE, json!({ "input": payload }))
            .await?;
        match data.issue_create {
            IssueCreatePayload {
                success: true,
                issue: Some(issue),
            } => Ok(issue),
            _ => Err(rejected("issueCreate", "issue was not created")),
        }
    }

    /// Add a markdown comment to an issue
    pub async fn create_comment(&self, issue_id: &str, body: &str) -> Result<()> {
        let data: CommentCreateData = self
            .graphql(
                "commentCreate",
                COMMENT_CREATE,
                json!({ "input": { "issueId": issue_id, "body": body } }),
            )
            .await?;
        if data.comment_create.success {
            Ok(())
        } else {
            Err(rejected("commentCreate", "comment was not created"))
        }
    }

    /// Look up a workflow state id by name (case-insensitive)
    pub async fn workflow_state_id(&self, state_name: &str) -> Result<Option<String>> {
        let data: TeamStatesData = self
            .graphql(
                "team.states",
                TEAM_STATES,
                json!({ "teamId": self.config.team_id }),
            )
            .await?;
        let team = data
            .team
            .ok_or_else(|| rejected("team.states", "team not found"))?;
        Ok(team
            .states
            .nodes
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(state_name))
            .map(|s| s.id))
    }

    /// Move an issue to the named workflow state
    pub async fn transition_issue(&self, issue_id: &str, state_name: &str) -> Result<()> {
        let Some(state_id) = self.workflow_state_id(state_name).await? else {
            warn!(state = state_name, "Workflow state not found for team");
            return Err(rejected(
                "issueUpdate",
                &format!("workflow state '{state_name}' not found"),
            ));
        };

        let data: IssueUpdateData = self
            .graphql(
                "issueUpdate",
                ISSUE_UPDATE,
                json!({ "id": issue_id, "input": { "stateId": state_id } }),
            )
            .await?;
        if data.issue_update.success {
            Ok(())
        } else {
            Err(rejected("issueUpdate", "issue was not updated"))
        }
    }

    async fn graphql<T>(&self, operation: &str, query: &str, variables: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!(operation, "Linear request");
        let response = self
            .http
            .post(&self.config.api_url)
            .header(reqwest::header::AUTHORIZATION, self.config.api_key.as_str())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| RemoteError::Transport {
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

        let envelope: GraphQlEnvelope<T> =
            response.json().await.map_err(|e| RemoteError::Decode {
                service: SERVICE,
                operation: operation.to_string(),
                message: e.to_string(),
            })?;

        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            return Err(RemoteError::GraphQl {
                service: SERVICE,
                operation: operation.to_string(),
                message: truncate_for_error(&Value::Array(errors).to_string(), 400),
            });
        }

        envelope.data.ok_or_else(|| RemoteError::Decode {
            service: SERVICE,
            operation: operation.to_string(),
            message: "response has no data".to_string(),
        })
    }
}

fn rejected(operation: &str, message: &str) -> RemoteError {
    RemoteError::Rejected {
        service: SERVICE,
        operation: operation.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_key() {
        let config = LinearConfig::new("lin_api_secret", "team-1")
            .with_labels(vec!["label-bug".to_string()]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("lin_api_secret"));
        assert!(rendered.contains("team-1"));
        assert!(rendered.contains("label-bug"));
    }

    #[test]
    fn test_envelope_with_errors_parses() {
        let raw = r#"{"data":null,"errors":[{"message":"Authentication required"}]}"#;
        let envelope: GraphQlEnvelope<IssueCreateData> = serde_json::from_str(raw).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.errors.unwrap().len(), 1);
    }
}
