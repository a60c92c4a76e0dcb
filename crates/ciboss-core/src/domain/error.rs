//! Error taxonomy for the orchestration core.
//!
//! Every variant is soft from the orchestrator's point of view: components
//! absorb them into Run State or logs. Only [`CiError::InvalidRepository`] and
//! [`CiError::InvalidInput`] reach the caller, and only before a run starts.

use ciboss_remote::RemoteError;

/// Errors produced by the ciboss core.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("{integration} integration disabled: {key} is not set")]
    ConfigurationMissing {
        integration: &'static str,
        key: &'static str,
    },

    #[error("{service} API error: {message}")]
    UpstreamApi {
        service: &'static str,
        message: String,
    },

    #[error("test execution timed out after {after_secs}s")]
    TestExecutionTimeout { after_secs: u64 },

    #[error("test execution failed: {0}")]
    TestExecution(String),

    #[error("loop bound exceeded: {max_cycles} test cycles used")]
    LoopBoundExceeded { max_cycles: u32 },

    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    #[error("invalid run input: {0}")]
    InvalidInput(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("decision policy error: {0}")]
    Policy(String),
}

impl CiError {
    /// Wrap a remote client error, tagging it with the service it came from.
    pub fn upstream(service: &'static str, err: RemoteError) -> Self {
        CiError::UpstreamApi {
            service: err.service().unwrap_or(service),
            message: err.to_string(),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CiError>;
