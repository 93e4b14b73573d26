//! MCP-backed participants and tools.
//!
//! MCP servers from configuration are grouped into participants: each
//! configured participant owns its named servers, and all remaining
//! enabled servers collect under the default `mcp` participant. Server
//! connections are bracketed around each request that uses them.

use crate::builtin;
use crate::error::CoreResult;
use crate::events::ResponseEvent;
use crate::participant::{ChatCommand, ChatParticipant, ChatRequestOptions};
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::tool::{BoxedTool, PreInvokeResponse, Tool};
use crate::tool_loop::{run_tool_call_loop, ToolLoopOptions};
use async_trait::async_trait;
use nbintel_mcp::{McpServer, McpTool, ServerConfig, ToolContent};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A core tool backed by a tool on an MCP server.
pub struct McpRemoteTool {
    server: Arc<McpServer>,
    tool: McpTool,
    auto_approve: bool,
}

impl McpRemoteTool {
    pub fn new(server: Arc<McpServer>, tool: McpTool, auto_approve: bool) -> Self {
        Self {
            server,
            tool,
            auto_approve,
        }
    }
}

#[async_trait]
impl Tool for McpRemoteTool {
    fn name(&self) -> String {
        self.tool.name.clone()
    }

    fn description(&self) -> String {
        self.tool
            .description
            .clone()
            .unwrap_or_else(|| self.tool.name.clone())
    }

    fn parameters_schema(&self) -> Value {
        if self.tool.input_schema.is_object() {
            self.tool.input_schema.clone()
        } else {
            json!({"type": "object", "properties": {}})
        }
    }

    fn pre_invoke(&self, _request: &ChatRequest, args: &Value) -> Option<PreInvokeResponse> {
        let mut pre_invoke = if self.auto_approve {
            PreInvokeResponse::message(format!("Calling MCP tool '{}'", self.name()))
        } else {
            PreInvokeResponse::with_confirmation(
                format!("Calling MCP tool '{}'", self.name()),
                "Approve",
                "Are you sure you want to call this MCP tool?",
            )
        };
        pre_invoke = pre_invoke.with_detail(json!({
            "title": "Parameters",
            "content": args.to_string(),
        }));
        Some(pre_invoke)
    }

    async fn invoke(
        &self,
        _request: &ChatRequest,
        response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        // Only pass arguments the schema declares.
        let mut call_args = Map::new();
        if let Some(properties) = self
            .parameters_schema()
            .get("properties")
            .and_then(Value::as_object)
        {
            for key in properties.keys() {
                if let Some(value) = args.get(key) {
                    call_args.insert(key.clone(), value.clone());
                }
            }
        }

        // Transport failures are reported back to the model as a result
        // string; the loop keeps going.
        let result = match self
            .server
            .call_tool(&self.tool.name, Value::Object(call_args))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                error!(tool = %self.tool.name, server = %self.server.name(), error = %err,
                    "MCP tool call failed");
                return Ok(Value::String(format!(
                    "Error occurred while calling MCP tool: {}",
                    err
                )));
            }
        };

        let mut text_contents = Vec::new();
        for content in result.content {
            match content {
                ToolContent::Text { text } => text_contents.push(text),
                ToolContent::Image { data, mime_type } => {
                    response.stream(ResponseEvent::Image {
                        content: format!("data:{};base64,{}", mime_type, data),
                    });
                }
            }
        }

        if text_contents.is_empty() {
            Ok(Value::String("success".to_string()))
        } else {
            Ok(Value::String(text_contents.join("\n")))
        }
    }
}

/// A participant whose tools come from one or more MCP servers, plus any
/// configured built-in notebook tools.
pub struct McpParticipant {
    id: String,
    name: String,
    servers: Vec<Arc<McpServer>>,
    nbi_tools: Vec<String>,
}

impl McpParticipant {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        servers: Vec<Arc<McpServer>>,
        nbi_tools: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            servers,
            nbi_tools,
        }
    }

    /// The servers backing this participant.
    pub fn servers(&self) -> &[Arc<McpServer>] {
        &self.servers
    }
}

#[async_trait]
impl ChatParticipant for McpParticipant {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn commands(&self) -> Vec<ChatCommand> {
        vec![ChatCommand::new("info", "Lists server tools")]
    }

    async fn tools(&self, _request: &ChatRequest) -> Vec<BoxedTool> {
        let mut tools: Vec<BoxedTool> = Vec::new();
        for server in &self.servers {
            for tool in server.tools().await {
                let auto_approve = server.is_auto_approved(&tool.name);
                tools.push(Arc::new(McpRemoteTool::new(
                    server.clone(),
                    tool,
                    auto_approve,
                )));
            }
        }
        for name in &self.nbi_tools {
            if let Some(tool) = builtin::tool_by_name(name) {
                tools.push(tool);
            }
        }
        tools
    }

    async fn handle_chat_request(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    ) {
        response.stream(ResponseEvent::progress("Thinking..."));

        if request.command == "info" {
            for server in &self.servers {
                let mut info_lines = vec![format!("- **{}** server tools:", server.name())];
                for tool in server.tools().await {
                    info_lines.push(format!(
                        "  - **{}**: {}\n",
                        tool.name,
                        tool.description.unwrap_or_default()
                    ));
                }
                response.stream(ResponseEvent::markdown(info_lines.join("\n")));
            }
            response.finish();
            return;
        }

        for server in &self.servers {
            if let Err(err) = server.connect().await {
                warn!(server = %server.name(), error = %err, "failed to connect MCP server");
            }
        }

        let tools = self.tools(request).await;
        run_tool_call_loop(
            &tools,
            request,
            response,
            ToolLoopOptions {
                system_prompt: options.system_prompt.clone(),
                ..Default::default()
            },
            &json!({}),
        )
        .await;

        for server in &self.servers {
            if let Err(err) = server.disconnect().await {
                warn!(server = %server.name(), error = %err, "failed to disconnect MCP server");
            }
        }
    }
}

/// Builds MCP servers and participants from configuration.
pub struct McpManager {
    servers: Vec<Arc<McpServer>>,
    participants: Vec<Arc<McpParticipant>>,
}

impl McpManager {
    /// A manager with no servers.
    pub fn empty() -> Self {
        Self {
            servers: Vec::new(),
            participants: Vec::new(),
        }
    }

    /// Build servers and participants from the merged mcp configuration:
    /// `{"mcpServers": {...}, "participants": {...}}`.
    pub fn from_config(mcp_config: &Value) -> Self {
        let empty = Map::new();
        let servers_config = mcp_config
            .get("mcpServers")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let participants_config = mcp_config
            .get("participants")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut servers: Vec<Arc<McpServer>> = Vec::new();
        let mut participants: Vec<Arc<McpParticipant>> = Vec::new();

        for (participant_id, participant_config) in participants_config {
            let name = participant_config
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(participant_id);
            if name == "mcp" {
                continue;
            }
            let server_names: Vec<String> = participant_config
                .get("servers")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let nbi_tools = nbi_tools(participant_config);

            let participant_servers = create_servers(&server_names, servers_config);
            if !participant_servers.is_empty() {
                servers.extend(participant_servers.iter().cloned());
                participants.push(Arc::new(McpParticipant::new(
                    format!("mcp-{}", participant_id),
                    name,
                    participant_servers,
                    nbi_tools,
                )));
            }
        }

        // Enabled servers not named by any participant collect under the
        // default "mcp" participant.
        let used: HashSet<String> = servers.iter().map(|s| s.name().to_string()).collect();
        let unused: Vec<String> = servers_config
            .iter()
            .filter(|(name, config)| {
                !disabled(config) && !used.contains(name.as_str())
            })
            .map(|(name, _)| name.clone())
            .collect();

        if !unused.is_empty() {
            let default_tools = participants_config
                .get("mcp")
                .map(nbi_tools)
                .unwrap_or_default();
            let unused_servers = create_servers(&unused, servers_config);
            servers.extend(unused_servers.iter().cloned());
            participants.push(Arc::new(McpParticipant::new(
                "mcp",
                "MCP",
                unused_servers,
                default_tools,
            )));
        }

        Self {
            servers,
            participants,
        }
    }

    /// All configured servers.
    pub fn servers(&self) -> &[Arc<McpServer>] {
        &self.servers
    }

    /// A server by name.
    pub fn server(&self, name: &str) -> Option<Arc<McpServer>> {
        self.servers.iter().find(|s| s.name() == name).cloned()
    }

    /// The participants built from configuration.
    pub fn participants(&self) -> &[Arc<McpParticipant>] {
        &self.participants
    }

    /// Discover tool lists in the background.
    pub fn spawn_tool_discovery(&self) {
        for server in &self.servers {
            let server = server.clone();
            tokio::spawn(async move {
                match server.update_tool_list().await {
                    Ok(()) => info!(server = %server.name(), "MCP tool list updated"),
                    Err(err) => {
                        error!(server = %server.name(), error = %err,
                            "failed to update MCP tool list");
                    }
                }
            });
        }
    }
}

fn nbi_tools(participant_config: &Value) -> Vec<String> {
    participant_config
        .get("nbiTools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn disabled(server_config: &Value) -> bool {
    server_config
        .get("disabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn create_servers(
    server_names: &[String],
    servers_config: &Map<String, Value>,
) -> Vec<Arc<McpServer>> {
    let mut servers = Vec::new();
    for server_name in server_names {
        let Some(server_config) = servers_config.get(server_name) else {
            error!(server = %server_name, "server not found in MCP configuration");
            continue;
        };
        if disabled(server_config) {
            info!(server = %server_name, "MCP server is disabled, skipping");
            continue;
        }
        match ServerConfig::from_json(server_name, server_config) {
            Ok(config) => servers.push(Arc::new(McpServer::new(config))),
            Err(err) => {
                error!(server = %server_name, error = %err, "invalid MCP server configuration");
            }
        }
    }
    servers
}
