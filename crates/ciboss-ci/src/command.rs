//! Test command definitions and configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command run when nothing else is configured.
pub const DEFAULT_TEST_COMMAND: &str = "npx playwright test";

/// Human-readable name of the default command, used in issue titles.
pub const DEFAULT_COMMAND_NAME: &str = "Playwright";

/// Default ceiling for one test execution (30 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Configuration for the test command of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCommand {
    /// Human-readable command type (e.g. "Playwright").
    pub name: String,

    /// Command to execute (first element is executable).
    pub program: Vec<String>,

    /// Working directory, inherited from the caller when unset.
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds.
    pub timeout_secs: u64,
}

impl TestCommand {
    /// Run a command line through the platform shell.
    pub fn shell(name: impl Into<String>, line: impl Into<String>) -> Self {
        Self::argv(name, shell_program(line.into()))
    }

    /// Run an explicit argv without a shell.
    pub fn argv(name: impl Into<String>, program: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program,
            working_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The command as it would be typed, for logs and reports.
    pub fn display_line(&self) -> String {
        match self.program.as_slice() {
            [shell, flag, line] if is_shell_invocation(shell, flag) => line.clone(),
            _ => self.program.join(" "),
        }
    }
}

impl Default for TestCommand {
    fn default() -> Self {
        Self::shell(DEFAULT_COMMAND_NAME, DEFAULT_TEST_COMMAND)
    }
}

#[cfg(not(windows))]
fn shell_program(line: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), line]
}

#[cfg(windows)]
fn shell_program(line: String) -> Vec<String> {
    vec!["cmd".to_string(), "/C".to_string(), line]
}

fn is_shell_invocation(shell: &str, flag: &str) -> bool {
    matches!((shell, flag), ("sh", "-c") | ("cmd", "/C"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let command = TestCommand::default();
        assert_eq!(command.name, "Playwright");
        assert_eq!(command.timeout_secs, 1800);
        assert_eq!(command.display_line(), "npx playwright test");
        assert!(command.working_dir.is_none());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_shell_wraps_line() {
        let command = TestCommand::shell("unit", "cargo test --workspace");
        assert_eq!(command.program, vec!["sh", "-c", "cargo test --workspace"]);
    }

    #[test]
    fn test_argv_display_joins_arguments() {
        let command = TestCommand::argv(
            "unit",
            vec!["cargo".to_string(), "test".to_string(), "--workspace".to_string()],
        );
        assert_eq!(command.display_line(), "cargo test --workspace");
    }

    #[test]
    fn test_builders() {
        let command = TestCommand::shell("e2e", "npm test")
            .with_working_dir("/srv/app")
            .with_timeout_secs(60);
        assert_eq!(command.working_dir, Some(PathBuf::from("/srv/app")));
        assert_eq!(command.timeout_secs, 60);
    }
}
