//! Error types for remote service clients

use thiserror::Error;

/// Errors that can occur when talking to a remote service
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Repository reference is not `owner/name`
    #[error("invalid repository reference: {0}")]
    InvalidRepository(String),

    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    ClientSetup(String),

    /// Transport-level failure (DNS, TLS, timeout, connection reset)
    #[error("{service} {operation} request failed: {message}")]
    Transport {
        service: &'static str,
        operation: String,
        message: String,
    },

    /// Non-success HTTP status
    #[error("{service} {operation} failed with status {status}: {body}")]
    Status {
        service: &'static str,
        operation: String,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("{service} {operation} returned an unexpected payload: {message}")]
    Decode {
        service: &'static str,
        operation: String,
        message: String,
    },

    /// GraphQL `errors` array present in a 200 response
    #[error("{service} {operation} returned GraphQL errors: {message}")]
    GraphQl {
        service: &'static str,
        operation: String,
        message: String,
    },

    /// Mutation reported `success: false` or a lookup found nothing
    #[error("{service} {operation} was rejected: {message}")]
    Rejected {
        service: &'static str,
        operation: String,
        message: String,
    },
}

impl RemoteError {
    /// Name of the service the error came from, when known.
    pub fn service(&self) -> Option<&'static str> {
        match self {
            RemoteError::Transport { service, .. }
            | RemoteError::Status { service, .. }
            | RemoteError::Decode { service, .. }
            | RemoteError::GraphQl { service, .. }
            | RemoteError::Rejected { service, .. } => Some(service),
            RemoteError::InvalidRepository(_) | RemoteError::ClientSetup(_) => None,
        }
    }
}
