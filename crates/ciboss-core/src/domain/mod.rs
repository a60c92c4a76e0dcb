//! Domain types threaded through a CI run.

pub mod error;
pub mod run_state;

pub use error::{CiError, Result};
pub use run_state::{
    Degradation, NextAction, RunInput, RunState, TestStatus, TrackedIssue,
    MAX_COMMIT_MESSAGE_CHARS,
};
