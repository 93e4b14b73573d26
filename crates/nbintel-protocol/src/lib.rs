//! Wire protocol types shared between the notebook front end and the
//! nbintel server.
//!
//! Every frame on the chat WebSocket is an envelope `{id, type, data}`.
//! The `id` is the front end's message id; it correlates a request with
//! all of the response frames streamed back for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Request types sent by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    ChatRequest,
    ChatUserInput,
    ClearChatHistory,
    RunUiCommandResponse,
    GenerateCode,
    CancelChatRequest,
    InlineCompletionRequest,
    CancelInlineCompletionRequest,
}

/// Response types sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseType {
    StreamMessage,
    StreamEnd,
    RunUiCommand,
}

/// An incoming request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Front-end message id.
    pub id: String,

    #[serde(rename = "type")]
    pub request_type: RequestType,

    #[serde(default)]
    pub data: Value,
}

/// An outgoing response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Message id this response belongs to.
    pub id: String,

    /// Participant that produced the response.
    pub participant: String,

    #[serde(rename = "type")]
    pub response_type: ResponseType,

    pub data: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl ResponseEnvelope {
    /// Build a stream-message envelope stamped with the current time.
    pub fn stream_message(id: impl Into<String>, participant: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            participant: participant.into(),
            response_type: ResponseType::StreamMessage,
            data,
            created: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Build a stream-end envelope.
    pub fn stream_end(id: impl Into<String>, participant: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            participant: participant.into(),
            response_type: ResponseType::StreamEnd,
            data: Value::Object(Default::default()),
            created: None,
        }
    }

    /// Build a run-ui-command envelope.
    pub fn run_ui_command(
        id: impl Into<String>,
        participant: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            participant: participant.into(),
            response_type: ResponseType::RunUiCommand,
            data,
            created: None,
        }
    }
}

/// Payload of a chat-request envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequestData {
    #[serde(rename = "chatId")]
    pub chat_id: String,

    pub prompt: String,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub filename: Option<String>,

    #[serde(rename = "additionalContext", default)]
    pub additional_context: Vec<ContextItem>,

    /// "ask" or "agent"; anything else falls back to ask.
    #[serde(rename = "chatMode", default)]
    pub chat_mode: Option<String>,

    #[serde(rename = "toolSelections", default)]
    pub tool_selections: Option<ToolSelections>,
}

/// A file/cell context attachment on a chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextItem {
    #[serde(rename = "filePath")]
    pub file_path: String,

    #[serde(rename = "startLine", default)]
    pub start_line: Option<i64>,

    #[serde(rename = "endLine", default)]
    pub end_line: Option<i64>,

    #[serde(rename = "currentCellContents", default)]
    pub current_cell_contents: Option<CellContents>,

    #[serde(default)]
    pub content: Option<String>,
}

/// Currently selected cell input and output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellContents {
    #[serde(default)]
    pub input: Option<String>,

    #[serde(default)]
    pub output: Option<String>,
}

/// Tool selections attached to an agent-mode chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSelections {
    #[serde(rename = "builtinToolsets", default)]
    pub builtin_toolsets: Vec<String>,

    /// MCP server name -> selected tool names.
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, Vec<String>>,

    /// Extension id -> toolset id -> selected tool names.
    #[serde(default)]
    pub extensions: HashMap<String, HashMap<String, Vec<String>>>,
}

/// Payload of a generate-code envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateCodeData {
    #[serde(rename = "chatId")]
    pub chat_id: String,

    pub prompt: String,

    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub suffix: String,

    #[serde(rename = "existingCode", default)]
    pub existing_code: String,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub filename: Option<String>,
}

/// Payload of an inline-completion-request envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InlineCompletionData {
    #[serde(rename = "chatId")]
    pub chat_id: String,

    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub suffix: String,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub filename: Option<String>,
}

/// Payload of a chat-user-input envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInputData {
    pub callback_id: String,

    #[serde(default)]
    pub data: Value,
}

/// Payload of a run-ui-command-response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiCommandResponseData {
    pub callback_id: String,

    #[serde(default)]
    pub result: Value,
}

/// Payload of an outgoing run-ui-command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunUiCommandData {
    pub callback_id: String,

    #[serde(rename = "commandId")]
    pub command_id: String,

    #[serde(default)]
    pub args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_deserialize() {
        let json = r#"{"id": "msg-1", "type": "chat-request", "data": {"chatId": "c1", "prompt": "hello"}}"#;
        let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.id, "msg-1");
        assert_eq!(envelope.request_type, RequestType::ChatRequest);

        let data: ChatRequestData = serde_json::from_value(envelope.data).unwrap();
        assert_eq!(data.chat_id, "c1");
        assert_eq!(data.prompt, "hello");
        assert!(data.additional_context.is_empty());
    }

    #[test]
    fn test_cancel_types_deserialize() {
        let json = r#"{"id": "msg-1", "type": "cancel-chat-request"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.request_type, RequestType::CancelChatRequest);

        let json = r#"{"id": "msg-2", "type": "cancel-inline-completion-request"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            envelope.request_type,
            RequestType::CancelInlineCompletionRequest
        );
    }

    #[test]
    fn test_response_envelope_serialize() {
        let envelope = ResponseEnvelope::stream_end("msg-1", "default");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "stream-end");
        assert_eq!(json["id"], "msg-1");
        assert_eq!(json["participant"], "default");
        assert_eq!(json["data"], json!({}));
        assert!(json.get("created").is_none());
    }

    #[test]
    fn test_stream_message_has_timestamp() {
        let envelope = ResponseEnvelope::stream_message("msg-1", "default", json!({"x": 1}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "stream-message");
        assert!(json["created"].is_string());
    }

    #[test]
    fn test_tool_selections_deserialize() {
        let json = r#"{
            "builtinToolsets": ["notebook-edit"],
            "mcpServers": {"files": ["read_file"]},
            "extensions": {"ext": {"ts": ["tool_a"]}}
        }"#;
        let selections: ToolSelections = serde_json::from_str(json).unwrap();
        assert_eq!(selections.builtin_toolsets, vec!["notebook-edit"]);
        assert_eq!(selections.mcp_servers["files"], vec!["read_file"]);
        assert_eq!(selections.extensions["ext"]["ts"], vec!["tool_a"]);
    }

    #[test]
    fn test_run_ui_command_data_roundtrip() {
        let data = RunUiCommandData {
            callback_id: "cb-1".to_string(),
            command_id: "notebook:create-new".to_string(),
            args: json!({"code": ""}),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["commandId"], "notebook:create-new");

        let parsed: RunUiCommandData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.callback_id, "cb-1");
    }

    #[test]
    fn test_unknown_request_type_fails() {
        let json = r#"{"id": "msg-1", "type": "bogus"}"#;
        assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());
    }

    #[test]
    fn test_context_item_defaults() {
        let item: ContextItem = serde_json::from_str(r#"{"filePath": "nb.ipynb"}"#).unwrap();
        assert_eq!(item.file_path, "nb.ipynb");
        assert!(item.start_line.is_none());
        assert!(item.current_cell_contents.is_none());
    }
}
