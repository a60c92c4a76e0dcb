//! ciboss CI - test command execution
//!
//! Provides the subprocess side of a CI run:
//! - Configurable test commands (shell line or argv)
//! - Execution with an absolute wall-clock timeout and forced termination
//! - Merged stdout/stderr capture truncated to a fixed character budget

pub mod command;
pub mod error;
pub mod logs;
pub mod runner;

// Re-export key types
pub use command::{TestCommand, DEFAULT_COMMAND_NAME, DEFAULT_TEST_COMMAND, DEFAULT_TIMEOUT_SECS};
pub use error::ExecError;
pub use logs::{truncate_chars, MAX_LOG_CHARS};
pub use runner::{CommandRunner, TestOutcome, TestReport};
