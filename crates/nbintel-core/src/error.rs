//! Error types for the core crate.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Provider error.
    #[error("provider error: {0}")]
    Provider(#[from] nbintel_provider::ProviderError),

    /// MCP error.
    #[error("mcp error: {0}")]
    Mcp(#[from] nbintel_mcp::McpError),

    /// Tool arguments could not be bound to the schema.
    #[error("tool argument error: {0}")]
    ToolArguments(String),

    /// Tool execution failed.
    #[error("tool error: {0}")]
    Tool(String),

    /// The reply channel was dropped before a correlated response arrived.
    #[error("reply channel closed for callback {0}")]
    ReplyChannelClosed(String),

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a tool error.
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::tool("boom");
        assert_eq!(err.to_string(), "tool error: boom");

        let err = CoreError::ReplyChannelClosed("cb-1".to_string());
        assert!(err.to_string().contains("cb-1"));
    }
}
