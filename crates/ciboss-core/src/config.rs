//! Runtime configuration read from the environment.
//!
//! Every integration is optional. A missing credential disables exactly that
//! integration; empty values count as missing.

use std::path::PathBuf;

use ciboss_ci::TestCommand;
use ciboss_remote::{ChatConfig, GithubConfig, LinearConfig};
use serde::Serialize;

use crate::domain::error::{CiError, Result};

/// Cycle limit used when `CIBOSS_MAX_CYCLES` is not set.
pub const DEFAULT_MAX_CYCLES: u32 = 3;

/// An optional integration: configured, or disabled because `key` is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integration<T> {
    Enabled(T),
    Disabled { key: &'static str },
}

impl<T> Integration<T> {
    pub fn enabled(&self) -> Option<&T> {
        match self {
            Integration::Enabled(config) => Some(config),
            Integration::Disabled { .. } => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Integration::Enabled(_))
    }

    /// Name of the setting whose absence disabled the integration.
    pub fn missing_key(&self) -> Option<&'static str> {
        match self {
            Integration::Enabled(_) => None,
            Integration::Disabled { key } => Some(key),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct CiBossConfig {
    pub github: Integration<GithubConfig>,
    pub linear: Integration<LinearConfig>,
    /// Chat model for the planner; the rule-based policy is used without it.
    pub chat: Integration<ChatConfig>,
    pub test_command: TestCommand,
    pub max_cycles: u32,
}

impl Default for CiBossConfig {
    fn default() -> Self {
        Self {
            github: Integration::Disabled { key: "GITHUB_TOKEN" },
            linear: Integration::Disabled {
                key: "LINEAR_API_KEY",
            },
            chat: Integration::Disabled {
                key: "OPENAI_API_KEY",
            },
            test_command: TestCommand::default(),
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

impl CiBossConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; values that are empty after
    /// trimming are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let github = match get("GITHUB_TOKEN") {
            Some(token) => {
                let mut config = GithubConfig::new(&token);
                if let Some(base) = get("GITHUB_API_URL") {
                    config = config.with_api_base(&base);
                }
                Integration::Enabled(config)
            }
            None => Integration::Disabled { key: "GITHUB_TOKEN" },
        };

        let linear = match (get("LINEAR_API_KEY"), get("LINEAR_TEAM_ID")) {
            (Some(api_key), Some(team_id)) => {
                let labels = ["LINEAR_LABEL_ID_BUG", "LINEAR_LABEL_ID_TEST_FAILURE"]
                    .iter()
                    .filter_map(|key| get(*key))
                    .collect();
                let mut config = LinearConfig::new(&api_key, &team_id).with_labels(labels);
                if let Some(url) = get("LINEAR_API_URL") {
                    config = config.with_api_url(&url);
                }
                Integration::Enabled(config)
            }
            (None, _) => Integration::Disabled {
                key: "LINEAR_API_KEY",
            },
            (Some(_), None) => Integration::Disabled {
                key: "LINEAR_TEAM_ID",
            },
        };

        let chat = match get("OPENAI_API_KEY") {
            Some(api_key) => {
                let mut config = ChatConfig::new(&api_key);
                if let Some(model) = get("OPENAI_MODEL") {
                    config = config.with_model(&model);
                }
                if let Some(url) = get("OPENAI_API_URL") {
                    config = config.with_api_url(&url);
                }
                Integration::Enabled(config)
            }
            None => Integration::Disabled {
                key: "OPENAI_API_KEY",
            },
        };

        let mut test_command = match get("PLAYWRIGHT_COMMAND") {
            Some(line) => TestCommand::shell(ciboss_ci::DEFAULT_COMMAND_NAME, line),
            None => TestCommand::default(),
        };
        if let Some(name) = get("CIBOSS_TEST_NAME") {
            test_command.name = name;
        }
        if let Some(dir) = get("PLAYWRIGHT_WORKING_DIR") {
            test_command = test_command.with_working_dir(PathBuf::from(dir));
        }
        if let Some(raw) = get("PLAYWRIGHT_TIMEOUT_SECS") {
            let secs = parse_positive("PLAYWRIGHT_TIMEOUT_SECS", &raw)?;
            test_command = test_command.with_timeout_secs(secs);
        }

        let max_cycles = match get("CIBOSS_MAX_CYCLES") {
            Some(raw) => {
                let cycles = parse_positive("CIBOSS_MAX_CYCLES", &raw)?;
                u32::try_from(cycles).map_err(|_| {
                    CiError::InvalidInput(format!("CIBOSS_MAX_CYCLES out of range: {raw}"))
                })?
            }
            None => DEFAULT_MAX_CYCLES,
        };

        Ok(Self {
            github,
            linear,
            chat,
            test_command,
            max_cycles,
        })
    }

    /// Secret-free view of the configuration.
    pub fn report(&self) -> ConfigReport {
        ConfigReport {
            github: describe(&self.github, |c| format!("enabled (api {})", c.api_base)),
            linear: describe(&self.linear, |c| {
                format!("enabled (team {}, {} label(s))", c.team_id, c.label_ids.len())
            }),
            planner: match &self.chat {
                Integration::Enabled(c) => format!("chat (model {})", c.model),
                Integration::Disabled { .. } => "rule_based".to_string(),
            },
            test_command: self.test_command.display_line(),
            test_name: self.test_command.name.clone(),
            working_dir: self
                .test_command
                .working_dir
                .as_ref()
                .map(|d| d.display().to_string()),
            timeout_secs: self.test_command.timeout_secs,
            max_cycles: self.max_cycles,
        }
    }
}

/// What `ciboss config` prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    pub github: String,
    pub linear: String,
    pub planner: String,
    pub test_command: String,
    pub test_name: String,
    pub working_dir: Option<String>,
    pub timeout_secs: u64,
    pub max_cycles: u32,
}

fn describe<T>(integration: &Integration<T>, enabled: impl Fn(&T) -> String) -> String {
    match integration {
        Integration::Enabled(config) => enabled(config),
        Integration::Disabled { key } => format!("disabled ({key} not set)"),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CiError::InvalidInput(format!(
            "{key} must be a positive integer, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_disables_everything() {
        let config = CiBossConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.github.missing_key(), Some("GITHUB_TOKEN"));
        assert_eq!(config.linear.missing_key(), Some("LINEAR_API_KEY"));
        assert!(!config.chat.is_enabled());
        assert_eq!(config.max_cycles, DEFAULT_MAX_CYCLES);
        assert_eq!(config.test_command, TestCommand::default());
    }

    #[test]
    fn test_each_credential_enables_only_its_integration() {
        let config = CiBossConfig::from_lookup(lookup(&[("GITHUB_TOKEN", "ghp_x")])).unwrap();
        assert!(config.github.is_enabled());
        assert!(!config.linear.is_enabled());
        assert!(!config.chat.is_enabled());
    }

    #[test]
    fn test_linear_needs_team_id() {
        let config = CiBossConfig::from_lookup(lookup(&[("LINEAR_API_KEY", "lin_x")])).unwrap();
        assert_eq!(config.linear.missing_key(), Some("LINEAR_TEAM_ID"));
    }

    #[test]
    fn test_blank_values_are_missing() {
        let config = CiBossConfig::from_lookup(lookup(&[("GITHUB_TOKEN", "   ")])).unwrap();
        assert!(!config.github.is_enabled());
    }

    #[test]
    fn test_full_environment() {
        let config = CiBossConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_API_URL", "http://127.0.0.1:9000/"),
            ("LINEAR_API_KEY", "lin_x"),
            ("LINEAR_TEAM_ID", "team-1"),
            ("LINEAR_LABEL_ID_BUG", "label-bug"),
            ("LINEAR_LABEL_ID_TEST_FAILURE", "label-tf"),
            ("OPENAI_API_KEY", "sk-x"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("PLAYWRIGHT_COMMAND", "npm test"),
            ("PLAYWRIGHT_WORKING_DIR", "/srv/app"),
            ("PLAYWRIGHT_TIMEOUT_SECS", "60"),
            ("CIBOSS_MAX_CYCLES", "5"),
        ]))
        .unwrap();

        let linear = config.linear.enabled().unwrap();
        assert_eq!(linear.label_ids, vec!["label-bug", "label-tf"]);
        assert_eq!(config.chat.enabled().unwrap().model, "gpt-4o-mini");
        assert_eq!(config.test_command.timeout_secs, 60);
        assert_eq!(
            config.test_command.working_dir,
            Some(PathBuf::from("/srv/app"))
        );
        assert_eq!(config.max_cycles, 5);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        for (key, value) in [
            ("PLAYWRIGHT_TIMEOUT_SECS", "soon"),
            ("CIBOSS_MAX_CYCLES", "0"),
        ] {
            let err = CiBossConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_report_never_contains_secrets() {
        let config = CiBossConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_secret_token"),
            ("LINEAR_API_KEY", "lin_secret_key"),
            ("LINEAR_TEAM_ID", "team-1"),
            ("OPENAI_API_KEY", "sk-secret"),
        ]))
        .unwrap();
        let rendered = serde_json::to_string(&config.report()).unwrap();
        let debug = format!("{config:?}");
        for secret in ["ghp_secret_token", "lin_secret_key", "sk-secret"] {
            assert!(!rendered.contains(secret));
            assert!(!debug.contains(secret));
        }
        assert_eq!(config.report().planner, "chat (model gpt-4o)");
    }
}
