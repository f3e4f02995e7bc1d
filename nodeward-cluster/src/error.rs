//! Error types for cluster access

use thiserror::Error;

/// Cluster access error types
#[derive(Debug, Error)]
pub enum Error {
    /// The agent connection could not be (re-)established
    #[error("Connection error: {0}")]
    Connection(String),

    /// A call to the node agents failed or answered only in part
    #[error("Remote call error: {0}")]
    RemoteCall(String),

    /// The cluster directory could not be queried
    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An agent answered with a payload that could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether another attempt of the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteCall(_) | Self::Timeout(_))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Self::RemoteCall(format!("{}: {}", status.code(), status.message()))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Self::Directory(err.to_string())
    }
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, Error>;
