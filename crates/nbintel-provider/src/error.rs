//! Error types for the provider crate.

use thiserror::Error;

/// Provider error types.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP transport error.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success API response.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// Authentication missing or rejected.
    #[error("auth error: {0}")]
    Auth(String),

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// Malformed stream or response body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error while reading a stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::api(401, "unauthorized");
        assert_eq!(err.to_string(), "api error 401: unauthorized");

        let err = ProviderError::internal("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
