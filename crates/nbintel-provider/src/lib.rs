//! LLM provider abstraction for nbintel.
//!
//! This crate provides a unified interface for chat and inline-completion
//! models across providers:
//! - OpenAI-compatible APIs
//! - LiteLLM-compatible gateways
//! - Ollama
//! - GitHub Copilot

pub mod error;
pub mod message;
pub mod model;

pub mod copilot;
pub mod litellm;
pub mod ollama;
pub mod openai_compatible;

// Testing provider
pub mod scripted;

pub use error::{ProviderError, ProviderResult};
pub use message::{Message, Role, ToolCall, ToolCallFunction};
pub use model::{ModelInfo, ModelProperty, PropertySet};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// A tool schema handed to the model.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Tool name, unique within the request.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: Value,
}

/// Tool-choice policy for a completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides whether to call tools.
    #[default]
    Auto,
    /// Model must call at least one tool.
    Required,
    /// Model must call the named tool.
    Named(String),
}

impl ToolChoice {
    /// Wire representation for OpenAI-compatible APIs.
    pub fn to_wire(&self) -> Value {
        match self {
            ToolChoice::Auto => Value::String("auto".to_string()),
            ToolChoice::Required => Value::String("required".to_string()),
            ToolChoice::Named(name) => serde_json::json!({
                "type": "function",
                "function": {"name": name}
            }),
        }
    }
}

/// Options for a chat completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// System prompt prepended to the conversation.
    pub system_prompt: Option<String>,
    /// Tools offered to the model.
    pub tools: Vec<ToolDefinition>,
    /// Tool-choice policy.
    pub tool_choice: ToolChoice,
    /// Cancellation handle. Checked between stream frames; an in-flight
    /// read terminates at the next frame boundary.
    pub abort: Option<tokio_util::sync::CancellationToken>,
}

/// A chunk from a streaming chat completion.
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    /// Text content delta.
    TextDelta(String),
    /// A completed tool call. `id` is None when the model omitted one.
    ToolCall {
        id: Option<String>,
        name: String,
        arguments: Value,
    },
    /// The turn finished.
    Finish(FinishReason),
}

/// Reason a completion turn finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    #[default]
    EndTurn,
    MaxTokens,
    ToolUse,
    ContentFilter,
    Other,
}

impl FinishReason {
    /// Parse from an OpenAI-style finish_reason.
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => Self::EndTurn,
            "length" => Self::MaxTokens,
            "tool_calls" | "function_call" => Self::ToolUse,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// The stream type returned by chat models.
pub type CompletionStream = BoxStream<'static, ProviderResult<CompletionChunk>>;

/// A raw tool call collected from a completion turn.
#[derive(Debug, Clone)]
pub struct RawToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// Aggregate of one completion turn.
#[derive(Debug, Clone, Default)]
pub struct CompletionTurn {
    /// Concatenated text content.
    pub content: String,
    /// Tool calls in model order.
    pub tool_calls: Vec<RawToolCall>,
    /// Finish reason, if the stream reported one.
    pub finish: Option<FinishReason>,
}

/// Drain a completion stream into an aggregate turn.
pub async fn collect_turn(mut stream: CompletionStream) -> ProviderResult<CompletionTurn> {
    let mut turn = CompletionTurn::default();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            CompletionChunk::TextDelta(delta) => turn.content.push_str(&delta),
            CompletionChunk::ToolCall {
                id,
                name,
                arguments,
            } => turn.tool_calls.push(RawToolCall {
                id,
                name,
                arguments,
            }),
            CompletionChunk::Finish(reason) => turn.finish = Some(reason),
        }
    }
    Ok(turn)
}

/// The main trait for chat models.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model ID within its provider.
    fn id(&self) -> String;

    /// Human-readable model name.
    fn name(&self) -> String;

    /// Context window in tokens.
    fn context_window(&self) -> u32;

    /// Provider ID (e.g. "openai-compatible", "ollama").
    fn provider_id(&self) -> &str;

    /// Set a configurable property. Models without configurable
    /// properties ignore this.
    fn set_property(&self, _id: &str, _value: &str) {}

    /// Generate a streaming response.
    async fn completions(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> ProviderResult<CompletionStream>;
}

/// The trait for inline (fill-in-the-middle) completion models.
#[async_trait]
pub trait InlineCompletionModel: Send + Sync {
    /// Model ID within its provider.
    fn id(&self) -> String;

    /// Human-readable model name.
    fn name(&self) -> String;

    /// Context window in tokens.
    fn context_window(&self) -> u32;

    /// Set a configurable property. Models without configurable
    /// properties ignore this.
    fn set_property(&self, _id: &str, _value: &str) {}

    /// Complete the code between `prefix` and `suffix`.
    async fn inline_completions(
        &self,
        prefix: &str,
        suffix: &str,
        language: &str,
        filename: &str,
        abort: Option<tokio_util::sync::CancellationToken>,
    ) -> ProviderResult<String>;
}

/// A provider groups the models it can serve.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider ID.
    fn id(&self) -> &str;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Chat models this provider currently offers.
    async fn chat_models(&self) -> Vec<ModelInfo>;

    /// Inline completion models this provider currently offers.
    async fn inline_completion_models(&self) -> Vec<ModelInfo>;

    /// Resolve a chat model by ID.
    async fn chat_model(&self, model_id: &str) -> Option<Arc<dyn ChatModel>>;

    /// Resolve an inline completion model by ID.
    async fn inline_completion_model(&self, model_id: &str)
        -> Option<Arc<dyn InlineCompletionModel>>;

    /// Refresh any dynamic model lists. Default is a no-op.
    async fn refresh(&self) {}
}

/// Boxed trait objects for dynamic dispatch.
pub type BoxedChatModel = Arc<dyn ChatModel>;
pub type BoxedInlineCompletionModel = Arc<dyn InlineCompletionModel>;
pub type BoxedLlmProvider = Arc<dyn LlmProvider>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_choice_wire() {
        assert_eq!(ToolChoice::Auto.to_wire(), json!("auto"));
        assert_eq!(ToolChoice::Required.to_wire(), json!("required"));
        assert_eq!(
            ToolChoice::Named("add_code_cell".to_string()).to_wire(),
            json!({"type": "function", "function": {"name": "add_code_cell"}})
        );
    }

    #[test]
    fn test_finish_reason_from_openai() {
        assert_eq!(FinishReason::from_openai("stop"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_openai("tool_calls"), FinishReason::ToolUse);
        assert_eq!(FinishReason::from_openai("length"), FinishReason::MaxTokens);
        assert_eq!(FinishReason::from_openai("???"), FinishReason::Other);
    }

    #[tokio::test]
    async fn test_collect_turn() {
        let chunks = vec![
            Ok(CompletionChunk::TextDelta("Hello ".to_string())),
            Ok(CompletionChunk::TextDelta("world".to_string())),
            Ok(CompletionChunk::ToolCall {
                id: Some("call_1".to_string()),
                name: "add_code_cell".to_string(),
                arguments: json!({"source": "x = 1"}),
            }),
            Ok(CompletionChunk::Finish(FinishReason::ToolUse)),
        ];
        let stream: CompletionStream = Box::pin(futures::stream::iter(chunks));

        let turn = collect_turn(stream).await.unwrap();
        assert_eq!(turn.content, "Hello world");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "add_code_cell");
        assert_eq!(turn.finish, Some(FinishReason::ToolUse));
    }

    #[tokio::test]
    async fn test_collect_turn_propagates_error() {
        let chunks: Vec<ProviderResult<CompletionChunk>> = vec![
            Ok(CompletionChunk::TextDelta("partial".to_string())),
            Err(ProviderError::internal("boom")),
        ];
        let stream: CompletionStream = Box::pin(futures::stream::iter(chunks));

        assert!(collect_turn(stream).await.is_err());
    }
}
