//! Error types for the MCP crate.

use thiserror::Error;

/// MCP error types.
#[derive(Debug, Error)]
pub enum McpError {
    /// Server initialization failed.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Server not connected.
    #[error("server not connected: {0}")]
    NotConnected(String),

    /// Tool not found on any server.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool call returned an error.
    #[error("tool error: {0}")]
    ToolError(String),

    /// Protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid server configuration.
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::ToolNotFound("read_file".to_string());
        assert_eq!(err.to_string(), "tool not found: read_file");

        let err = McpError::Timeout(60);
        assert_eq!(err.to_string(), "request timed out after 60s");
    }
}
