//! OpenAI-compatible chat completion client used by the planning policy.

use crate::error::RemoteError;
use crate::{redact, truncate_for_error, Result, REQUEST_TIMEOUT_SECS, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Default chat completions endpoint
pub const DEFAULT_CHAT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

const SERVICE: &str = "chat";

/// Chat model configuration
#[derive(Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: String,
}

impl ChatConfig {
    pub fn new(api_key: &str) -> Self {
        ChatConfig {
            api_key: api_key.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_url: DEFAULT_CHAT_API_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client
#[derive(Clone)]
pub struct ChatClient {
    config: ChatConfig,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteError::ClientSetup(e.to_string()))?;
        Ok(ChatClient { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a single user prompt and return the first choice's text
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let operation = "chat completion";
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0,
            }))
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

        let completion: CompletionResponse =
            response.json().await.map_err(|e| RemoteError::Decode {
                service: SERVICE,
                operation: operation.to_string(),
                message: e.to_string(),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RemoteError::Decode {
                service: SERVICE,
                operation: operation.to_string(),
                message: "no choices in response".to_string(),
            })
    }
}
