// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Convert cluster errors to HTTP errors
impl From<nodeward_cluster::Error> for AppError {
    fn from(err: nodeward_cluster::Error) -> Self {
        use nodeward_cluster::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(format!("Not found: {msg}")),
            Error::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                Self::internal_server_error("Server misconfigured")
            }
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                Self::internal_server_error("Internal server error")
            }
            other @ (Error::Connection(_)
            | Error::RemoteCall(_)
            | Error::Directory(_)
            | Error::Decode(_)
            | Error::Timeout(_)
            | Error::Cancelled(_)) => {
                tracing::warn!(error = %other, "Request failed without usable data");
                Self::service_unavailable(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_error_status() {
        let cases = [
            (nodeward_cluster::Error::Connection("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (nodeward_cluster::Error::RemoteCall("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (nodeward_cluster::Error::Directory("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (nodeward_cluster::Error::Decode("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (nodeward_cluster::Error::NotFound("node 'x'".into()), StatusCode::NOT_FOUND),
            (nodeward_cluster::Error::Configuration("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
