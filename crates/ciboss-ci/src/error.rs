//! Error types for test command execution.

use thiserror::Error;

/// Errors raised while driving a test subprocess.
#[derive(Error, Debug)]
pub enum ExecError {
    /// No executable was configured
    #[error("test command is empty")]
    EmptyCommand,

    /// The executable could not be started
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading output or waiting on the child failed
    #[error("IO error while running tests: {0}")]
    Io(#[from] std::io::Error),

    /// The wall-clock ceiling expired; carries whatever output was captured
    #[error("test execution timed out after {after_secs}s")]
    TimedOut { after_secs: u64, partial_output: String },
}
