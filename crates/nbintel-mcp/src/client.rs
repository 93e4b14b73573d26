//! MCP server connection handle.
//!
//! An [`McpServer`] owns the configuration for one server and a live
//! transport while connected. Connections are bracketed around requests
//! that use the server: connect, call tools, disconnect.

use crate::error::{McpError, McpResult};
use crate::http::{HttpParams, HttpTransport};
use crate::protocol::{
    CallToolParams, InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, McpTool, ToolCallResult,
};
use crate::stdio::{StdioParams, StdioTransport};
use crate::transport::Transport;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Transport configuration for a server.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Spawn a child process and speak over stdio.
    Stdio(StdioParams),
    /// POST JSON-RPC messages to a URL.
    Http(HttpParams),
}

/// Configuration for one MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
    /// Tools that skip user confirmation.
    pub auto_approve_tools: Vec<String>,
}

impl ServerConfig {
    /// Parse a server entry from the mcp.json configuration shape:
    /// `{"command": ..., "args": [...], "env": {...}}` or
    /// `{"url": ..., "headers": {...}}`.
    pub fn from_json(name: &str, config: &Value) -> McpResult<Self> {
        let auto_approve_tools = config
            .get("autoApprove")
            .and_then(Value::as_array)
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if let Some(command) = config.get("command").and_then(Value::as_str) {
            let args = config
                .get("args")
                .and_then(Value::as_array)
                .map(|args| {
                    args.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let env = config
                .get("env")
                .and_then(Value::as_object)
                .map(|env| {
                    env.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            return Ok(Self {
                name: name.to_string(),
                transport: TransportConfig::Stdio(StdioParams {
                    command: command.to_string(),
                    args,
                    env,
                }),
                auto_approve_tools,
            });
        }

        if let Some(url) = config.get("url").and_then(Value::as_str) {
            let headers: HashMap<String, String> = config
                .get("headers")
                .and_then(Value::as_object)
                .map(|headers| {
                    headers
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            return Ok(Self {
                name: name.to_string(),
                transport: TransportConfig::Http(HttpParams {
                    url: url.to_string(),
                    headers,
                }),
                auto_approve_tools,
            });
        }

        Err(McpError::InvalidConfig(format!(
            "server '{}' has neither command nor url",
            name
        )))
    }
}

/// A connection handle to one MCP server.
pub struct McpServer {
    config: ServerConfig,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    tools: RwLock<Vec<McpTool>>,
    next_id: AtomicU64,
}

impl McpServer {
    /// Create a disconnected server handle.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            transport: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether a tool skips user confirmation.
    pub fn is_auto_approved(&self, tool_name: &str) -> bool {
        self.config
            .auto_approve_tools
            .iter()
            .any(|t| t == tool_name)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Connect and perform the MCP initialization handshake. A no-op when
    /// already connected.
    pub async fn connect(&self) -> McpResult<()> {
        if self.transport.read().await.is_some() {
            return Ok(());
        }

        info!(server = %self.config.name, "connecting to MCP server");
        let transport: Arc<dyn Transport> = match &self.config.transport {
            TransportConfig::Stdio(params) => Arc::new(StdioTransport::spawn(params)?),
            TransportConfig::Http(params) => Arc::new(HttpTransport::new(params.clone())),
        };

        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "initialize",
            Some(serde_json::to_value(InitializeParams::default())?),
        );
        let response = transport.request(request).await?;
        if let Some(error) = response.error {
            transport.close().await.ok();
            return Err(McpError::InitializationFailed(error.message));
        }

        transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        *self.transport.write().await = Some(transport);
        Ok(())
    }

    /// Close the connection. The cached tool list is kept.
    pub async fn disconnect(&self) -> McpResult<()> {
        if let Some(transport) = self.transport.write().await.take() {
            transport.close().await?;
            info!(server = %self.config.name, "disconnected from MCP server");
        }
        Ok(())
    }

    /// Refresh the cached tool list from the server. Connects on demand
    /// and disconnects again if this call opened the connection.
    pub async fn update_tool_list(&self) -> McpResult<()> {
        let was_connected = self.transport.read().await.is_some();
        self.connect().await?;

        let request = JsonRpcRequest::new(self.next_request_id(), "tools/list", None);
        let result = self.send_request(request).await;

        if !was_connected {
            self.disconnect().await.ok();
        }

        let response = result?;
        if let Some(error) = response.error {
            warn!(server = %self.config.name, code = error.code, message = %error.message,
                "failed to list tools");
            return Ok(());
        }

        let result: ListToolsResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::protocol("missing tools/list result"))?,
        )
        .map_err(|e| McpError::protocol(e.to_string()))?;

        debug!(server = %self.config.name, tool_count = result.tools.len(), "discovered MCP tools");
        *self.tools.write().await = result.tools;
        Ok(())
    }

    /// Cached tools, as last listed.
    pub async fn tools(&self) -> Vec<McpTool> {
        self.tools.read().await.clone()
    }

    /// Look up a cached tool by name.
    pub async fn tool(&self, tool_name: &str) -> Option<McpTool> {
        self.tools
            .read()
            .await
            .iter()
            .find(|t| t.name == tool_name)
            .cloned()
    }

    /// Call a tool on the server. Requires an open connection.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        let params = CallToolParams {
            name: tool_name.to_string(),
            arguments: Some(arguments),
        };
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "tools/call",
            Some(serde_json::to_value(&params)?),
        );

        let response = self.send_request(request).await?;
        if let Some(error) = response.error {
            return Err(McpError::ToolError(error.message));
        }

        serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::protocol("missing tools/call result"))?,
        )
        .map_err(|e| McpError::protocol(e.to_string()))
    }

    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::NotConnected(self.config.name.clone()))?;
        transport.request(request).await
    }
}
