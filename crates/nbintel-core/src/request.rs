//! Chat request types.

use crate::cancel::CancelToken;
use crate::service::Host;
use nbintel_provider::Message;
use std::collections::HashMap;
use std::sync::Arc;

/// Chat interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    /// Direct answering with a small safe tool set.
    #[default]
    Ask,
    /// Tool-augmented answering over the selected tool sources.
    Agent,
}

impl ChatMode {
    /// Parse from the wire value; anything unrecognized is ask mode.
    pub fn parse(s: &str) -> Self {
        match s {
            "agent" => ChatMode::Agent,
            _ => ChatMode::Ask,
        }
    }

    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Ask => "ask",
            ChatMode::Agent => "agent",
        }
    }
}

/// Tool sources selected for an agent-mode request.
#[derive(Debug, Clone, Default)]
pub struct ToolSelection {
    /// Selected built-in toolset ids.
    pub built_in_toolsets: Vec<String>,
    /// MCP server name -> selected tool names.
    pub mcp_server_tools: HashMap<String, Vec<String>>,
    /// Extension id -> toolset id -> selected tool names.
    pub extension_tools: HashMap<String, HashMap<String, Vec<String>>>,
}

/// A chat request being processed.
///
/// Created per incoming message; the router fills `command` and `prompt`
/// once before dispatch, after which the request is read-only.
#[derive(Clone)]
pub struct ChatRequest {
    /// The host granting access to models, config and tool sources.
    pub host: Arc<dyn Host>,

    /// Interaction mode.
    pub chat_mode: ChatMode,

    /// Tool sources selected for this request.
    pub tool_selection: ToolSelection,

    /// Resolved command, empty when none.
    pub command: String,

    /// Resolved prompt text (participant/command tokens stripped).
    pub prompt: String,

    /// Conversation context, a defensive copy of the stored history.
    pub chat_history: Vec<Message>,

    /// Cancellation handle shared with every sub-operation.
    pub cancel_token: CancelToken,
}

impl ChatRequest {
    /// Create a request with no command/prompt resolution yet.
    pub fn new(host: Arc<dyn Host>, prompt: impl Into<String>) -> Self {
        Self {
            host,
            chat_mode: ChatMode::Ask,
            tool_selection: ToolSelection::default(),
            command: String::new(),
            prompt: prompt.into(),
            chat_history: Vec::new(),
            cancel_token: CancelToken::new(),
        }
    }

    /// Set the interaction mode.
    pub fn with_chat_mode(mut self, chat_mode: ChatMode) -> Self {
        self.chat_mode = chat_mode;
        self
    }

    /// Set the tool selection.
    pub fn with_tool_selection(mut self, tool_selection: ToolSelection) -> Self {
        self.tool_selection = tool_selection;
        self
    }

    /// Set the conversation context.
    pub fn with_chat_history(mut self, chat_history: Vec<Message>) -> Self {
        self.chat_history = chat_history;
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel_token(mut self, cancel_token: CancelToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_mode_parse() {
        assert_eq!(ChatMode::parse("agent"), ChatMode::Agent);
        assert_eq!(ChatMode::parse("ask"), ChatMode::Ask);
        assert_eq!(ChatMode::parse("bogus"), ChatMode::Ask);
    }

    #[test]
    fn test_chat_mode_as_str() {
        assert_eq!(ChatMode::Agent.as_str(), "agent");
        assert_eq!(ChatMode::Ask.as_str(), "ask");
    }
}
