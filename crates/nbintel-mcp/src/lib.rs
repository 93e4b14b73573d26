//! Model Context Protocol (MCP) client for nbintel.
//!
//! Provides JSON-RPC protocol types, stdio and streamable-HTTP transports,
//! and a per-server connection handle with connect/disconnect lifecycle.

pub mod client;
pub mod error;
pub mod http;
pub mod protocol;
pub mod stdio;
pub mod transport;

pub use client::{McpServer, ServerConfig, TransportConfig};
pub use error::{McpError, McpResult};
pub use protocol::{McpTool, ToolCallResult, ToolContent};
pub use transport::Transport;
