//! OpenAI-compatible provider implementation.
//!
//! Serves any endpoint speaking the OpenAI chat-completions wire format.
//! The request/stream plumbing here is shared by the LiteLLM, Ollama and
//! Copilot adapters, which all talk the same shape.

use crate::{
    error::ProviderError,
    message::Message,
    model::{ModelInfo, ModelProperty, PropertySet},
    ChatModel, CompletionChunk, CompletionOptions, CompletionStream, FinishReason,
    InlineCompletionModel, LlmProvider, ProviderResult, ToolDefinition,
};
use async_stream::try_stream;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Convert a message to the OpenAI wire shape.
///
/// Tool-call arguments are re-encoded as JSON strings; strict endpoints
/// reject object-valued arguments on resent assistant messages.
pub(crate) fn wire_message(message: &Message) -> Value {
    let mut value = serde_json::to_value(message).unwrap_or_default();
    if let Some(calls) = value.get_mut("tool_calls").and_then(Value::as_array_mut) {
        for call in calls {
            if let Some(arguments) = call.pointer_mut("/function/arguments") {
                if !arguments.is_string() {
                    *arguments = Value::String(arguments.to_string());
                }
            }
        }
    }
    value
}

/// Build an OpenAI-compatible chat-completions request body.
pub(crate) fn build_chat_body(model: &str, messages: &[Message], options: &CompletionOptions) -> Value {
    let mut wire_messages: Vec<Value> = Vec::new();
    if let Some(system) = &options.system_prompt {
        wire_messages.push(json!({"role": "system", "content": system}));
    }
    wire_messages.extend(messages.iter().map(wire_message));

    let mut body = json!({
        "model": model,
        "messages": wire_messages,
        "stream": true,
    });

    if !options.tools.is_empty() {
        body["tools"] = Value::Array(options.tools.iter().map(wire_tool).collect());
        body["tool_choice"] = options.tool_choice.to_wire();
    }

    body
}

fn wire_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// OpenAI streaming chunk.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Send a chat-completions request and decode the SSE reply into chunks.
pub(crate) async fn send_chat_request(
    client: &reqwest::Client,
    url: String,
    api_key: Option<String>,
    body: Value,
    abort: Option<tokio_util::sync::CancellationToken>,
) -> ProviderResult<CompletionStream> {
    debug!(url = %url, "sending chat completion request");
    trace!(body = %body, "full request body");

    let mut request = client.post(&url).json(&body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!(status = %status, error = %error_text, "chat completion request failed");
        return Err(ProviderError::api(status.as_u16(), error_text));
    }

    let byte_stream = response.bytes_stream();

    Ok(Box::pin(try_stream! {
        use futures::StreamExt;
        use tokio::io::AsyncBufReadExt;
        use tokio_util::io::StreamReader;

        let reader = StreamReader::new(
            byte_stream.map(|r| r.map_err(std::io::Error::other))
        );
        let mut lines = reader.lines();

        // Tool calls assembled from deltas: (id, name, arguments)
        let mut tool_calls: Vec<(Option<String>, String, String)> = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if let Some(token) = &abort {
                if token.is_cancelled() {
                    Err(ProviderError::Cancelled)?;
                }
            }

            let line = line.trim();
            if line.is_empty() || line == "data: [DONE]" {
                continue;
            }
            let data = line.strip_prefix("data: ").unwrap_or(line);

            let chunk: ChatChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(error) => {
                    trace!(error = %error, data = %data, "skipping unparseable chunk");
                    continue;
                }
            };

            for choice in &chunk.choices {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        yield CompletionChunk::TextDelta(content.clone());
                    }
                }

                if let Some(deltas) = &choice.delta.tool_calls {
                    for delta in deltas {
                        while tool_calls.len() <= delta.index {
                            tool_calls.push((None, String::new(), String::new()));
                        }
                        let call = &mut tool_calls[delta.index];
                        if let Some(id) = &delta.id {
                            call.0 = Some(id.clone());
                        }
                        if let Some(function) = &delta.function {
                            if let Some(name) = &function.name {
                                call.1 = name.clone();
                            }
                            if let Some(arguments) = &function.arguments {
                                call.2.push_str(arguments);
                            }
                        }
                    }
                }

                if let Some(reason) = &choice.finish_reason {
                    for (id, name, arguments) in tool_calls.drain(..) {
                        if !name.is_empty() {
                            yield CompletionChunk::ToolCall {
                                id,
                                name,
                                arguments: Value::String(arguments),
                            };
                        }
                    }
                    yield CompletionChunk::Finish(FinishReason::from_openai(reason));
                }
            }
        }
    }))
}

/// Chat model backed by an OpenAI-compatible endpoint.
///
/// Which endpoint and model is configurable via properties, the same set
/// the front end edits in the model configuration dialog.
pub struct OpenAiCompatibleChatModel {
    provider_id: &'static str,
    properties: PropertySet,
    client: reqwest::Client,
    default_base_url: Option<String>,
}

impl OpenAiCompatibleChatModel {
    pub fn new(provider_id: &'static str, default_base_url: Option<String>) -> Self {
        Self {
            provider_id,
            properties: PropertySet::new(vec![
                ModelProperty::new("api_key", "API key", "API key", false),
                ModelProperty::new("model_id", "Model", "Model (must support streaming)", false),
                ModelProperty::new("base_url", "Base URL", "Base URL", true),
                ModelProperty::new("context_window", "Context window", "Context window length", true),
            ]),
            client: reqwest::Client::new(),
            default_base_url,
        }
    }

    fn base_url(&self) -> String {
        self.properties
            .get_non_empty("base_url")
            .or_else(|| self.default_base_url.clone())
            .unwrap_or_else(|| OPENAI_API_URL.to_string())
    }

    /// Snapshot of configurable properties.
    pub fn properties(&self) -> Vec<ModelProperty> {
        self.properties.all()
    }

    /// Set a configurable property.
    pub fn set_property(&self, id: &str, value: &str) {
        self.properties.set(id, value);
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChatModel {
    fn id(&self) -> String {
        format!("{}-chat-model", self.provider_id)
    }

    fn name(&self) -> String {
        self.properties
            .get_non_empty("model_id")
            .unwrap_or_else(|| "Chat Model".to_string())
    }

    fn context_window(&self) -> u32 {
        self.properties.context_window()
    }

    fn provider_id(&self) -> &str {
        self.provider_id
    }

    fn set_property(&self, id: &str, value: &str) {
        self.properties.set(id, value);
    }

    async fn completions(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> ProviderResult<CompletionStream> {
        let model_id = self
            .properties
            .get_non_empty("model_id")
            .ok_or_else(|| ProviderError::Auth("model is not configured".to_string()))?;

        let body = build_chat_body(&model_id, &messages, &options);
        let url = format!("{}/chat/completions", self.base_url());

        send_chat_request(
            &self.client,
            url,
            self.properties.get_non_empty("api_key"),
            body,
            options.abort,
        )
        .await
    }
}

/// Inline completion model backed by the legacy completions endpoint.
pub struct OpenAiCompatibleInlineCompletionModel {
    provider_id: &'static str,
    properties: PropertySet,
    client: reqwest::Client,
    default_base_url: Option<String>,
}

impl OpenAiCompatibleInlineCompletionModel {
    pub fn new(provider_id: &'static str, default_base_url: Option<String>) -> Self {
        Self {
            provider_id,
            properties: PropertySet::new(vec![
                ModelProperty::new("api_key", "API key", "API key", false),
                ModelProperty::new("model_id", "Model", "Model", false),
                ModelProperty::new("base_url", "Base URL", "Base URL", true),
                ModelProperty::new("context_window", "Context window", "Context window length", true),
            ]),
            client: reqwest::Client::new(),
            default_base_url,
        }
    }

    fn base_url(&self) -> String {
        self.properties
            .get_non_empty("base_url")
            .or_else(|| self.default_base_url.clone())
            .unwrap_or_else(|| OPENAI_API_URL.to_string())
    }

    /// Snapshot of configurable properties.
    pub fn properties(&self) -> Vec<ModelProperty> {
        self.properties.all()
    }

    /// Set a configurable property.
    pub fn set_property(&self, id: &str, value: &str) {
        self.properties.set(id, value);
    }
}

#[async_trait]
impl InlineCompletionModel for OpenAiCompatibleInlineCompletionModel {
    fn id(&self) -> String {
        format!("{}-inline-completion-model", self.provider_id)
    }

    fn name(&self) -> String {
        "Inline Completion Model".to_string()
    }

    fn context_window(&self) -> u32 {
        self.properties.context_window()
    }

    fn set_property(&self, id: &str, value: &str) {
        self.properties.set(id, value);
    }

    async fn inline_completions(
        &self,
        prefix: &str,
        suffix: &str,
        _language: &str,
        _filename: &str,
        abort: Option<tokio_util::sync::CancellationToken>,
    ) -> ProviderResult<String> {
        let model_id = self
            .properties
            .get_non_empty("model_id")
            .ok_or_else(|| ProviderError::Auth("model is not configured".to_string()))?;

        let body = json!({
            "model": model_id,
            "prompt": prefix,
            "suffix": suffix,
            "stream": false,
        });

        let mut request = self
            .client
            .post(format!("{}/completions", self.base_url()))
            .json(&body);
        if let Some(key) = self.properties.get_non_empty("api_key") {
            request = request.bearer_auth(key);
        }

        let send = request.send();
        let response = match abort {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(ProviderError::Cancelled),
                response = send => response?,
            },
            None => send.await?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(status.as_u16(), error_text));
        }

        let body: Value = response.json().await?;
        Ok(body["choices"][0]["text"].as_str().unwrap_or("").to_string())
    }
}

/// OpenAI-compatible provider.
pub struct OpenAiCompatibleProvider {
    chat: Arc<OpenAiCompatibleChatModel>,
    inline: Arc<OpenAiCompatibleInlineCompletionModel>,
}

impl OpenAiCompatibleProvider {
    pub fn new() -> Self {
        Self {
            chat: Arc::new(OpenAiCompatibleChatModel::new("openai-compatible", None)),
            inline: Arc::new(OpenAiCompatibleInlineCompletionModel::new(
                "openai-compatible",
                None,
            )),
        }
    }
}

impl Default for OpenAiCompatibleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        "openai-compatible"
    }

    fn name(&self) -> &str {
        "OpenAI Compatible"
    }

    async fn chat_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo::new(self.chat.id(), self.chat.name())
            .with_context_window(self.chat.context_window())
            .with_properties(self.chat.properties())]
    }

    async fn inline_completion_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo::new(self.inline.id(), self.inline.name())
            .with_context_window(self.inline.context_window())
            .with_properties(self.inline.properties())]
    }

    async fn chat_model(&self, model_id: &str) -> Option<Arc<dyn ChatModel>> {
        (model_id == self.chat.id()).then(|| self.chat.clone() as Arc<dyn ChatModel>)
    }

    async fn inline_completion_model(
        &self,
        model_id: &str,
    ) -> Option<Arc<dyn InlineCompletionModel>> {
        (model_id == self.inline.id())
            .then(|| self.inline.clone() as Arc<dyn InlineCompletionModel>)
    }
}

impl OpenAiCompatibleProvider {
    /// Set a property on the chat model.
    pub fn set_chat_property(&self, id: &str, value: &str) {
        self.chat.set_property(id, value);
    }

    /// Set a property on the inline completion model.
    pub fn set_inline_property(&self, id: &str, value: &str) {
        self.inline.set_property(id, value);
    }
}
