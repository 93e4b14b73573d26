//! Per-connection chat session.
//!
//! A session owns the conversation history for its connection and a map
//! from message id to the in-flight response's emitter and cancel token.
//! Each chat, code-generation and inline-completion request runs on its
//! own task; user-input, UI-command replies and cancellations route to
//! the matching in-flight response by message id. Handler entries are
//! removed when their response completes, bounding memory for long-lived
//! connections.

use crate::emitter::WsResponseEmitter;
use nbintel_core::assistant::generate_code_system_prompt;
use nbintel_core::service::ContextRequest;
use nbintel_core::{
    parse_prompt, CancelToken, ChatHistory, ChatMode, ChatRequest, ChatRequestOptions,
    ChatService, Host, ResponseChannel, ResponseEvent, ToolSelection,
};
use nbintel_protocol::{
    ChatRequestData, ContextItem, GenerateCodeData, InlineCompletionData, RequestEnvelope,
    RequestType, ResponseEnvelope,
};
use nbintel_provider::Message;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handlers for one in-flight logical response.
struct MessageHandlers {
    emitter: Arc<WsResponseEmitter>,
    cancel_token: CancelToken,
}

/// A WebSocket session: bounded history plus in-flight response state.
pub struct ChatSession {
    service: Arc<ChatService>,
    history: Arc<ChatHistory>,
    handlers: Mutex<HashMap<String, MessageHandlers>>,
    outbound: mpsc::UnboundedSender<ResponseEnvelope>,
}

impl ChatSession {
    pub fn new(
        service: Arc<ChatService>,
        outbound: mpsc::UnboundedSender<ResponseEnvelope>,
    ) -> Arc<Self> {
        Arc::new(Self {
            service,
            history: Arc::new(ChatHistory::new()),
            handlers: Mutex::new(HashMap::new()),
            outbound,
        })
    }

    /// The session's history store.
    pub fn history(&self) -> Arc<ChatHistory> {
        self.history.clone()
    }

    /// Number of in-flight responses.
    pub fn in_flight(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// Dispatch one incoming envelope.
    pub fn handle_message(self: &Arc<Self>, envelope: RequestEnvelope) {
        match envelope.request_type {
            RequestType::ChatRequest => match serde_json::from_value(envelope.data) {
                Ok(data) => self.handle_chat_request(envelope.id, data),
                Err(error) => warn!(error = %error, "invalid chat-request payload"),
            },
            RequestType::GenerateCode => match serde_json::from_value(envelope.data) {
                Ok(data) => self.handle_generate_code(envelope.id, data),
                Err(error) => warn!(error = %error, "invalid generate-code payload"),
            },
            RequestType::InlineCompletionRequest => match serde_json::from_value(envelope.data) {
                Ok(data) => self.handle_inline_completion(envelope.id, data),
                Err(error) => warn!(error = %error, "invalid inline-completion payload"),
            },
            RequestType::ChatUserInput => {
                if let Some(handlers) = self.handlers.lock().unwrap().get(&envelope.id) {
                    handlers.emitter.on_user_input(envelope.data);
                }
            }
            RequestType::RunUiCommandResponse => {
                if let Some(handlers) = self.handlers.lock().unwrap().get(&envelope.id) {
                    handlers.emitter.on_run_ui_command_response(envelope.data);
                }
            }
            RequestType::ClearChatHistory => {
                self.history.clear(None);
            }
            RequestType::CancelChatRequest | RequestType::CancelInlineCompletionRequest => {
                if let Some(handlers) = self.handlers.lock().unwrap().get(&envelope.id) {
                    handlers.cancel_token.request_cancel();
                }
            }
        }
    }

    fn register(&self, message_id: &str, chat_id: &str) -> (Arc<WsResponseEmitter>, CancelToken) {
        let emitter = Arc::new(WsResponseEmitter::new(
            chat_id,
            message_id,
            self.history.clone(),
            self.outbound.clone(),
        ));
        let cancel_token = CancelToken::new();
        self.handlers.lock().unwrap().insert(
            message_id.to_string(),
            MessageHandlers {
                emitter: emitter.clone(),
                cancel_token: cancel_token.clone(),
            },
        );
        (emitter, cancel_token)
    }

    fn remove(&self, message_id: &str) {
        self.handlers.lock().unwrap().remove(message_id);
        debug!(message_id = %message_id, "response handlers removed");
    }

    fn handle_chat_request(self: &Arc<Self>, message_id: String, data: ChatRequestData) {
        let chat_mode = ChatMode::parse(
            data.chat_mode
                .as_deref()
                .unwrap_or(&self.service.config().default_chat_mode()),
        );
        let tool_selection = data
            .tool_selections
            .as_ref()
            .map(|selections| ToolSelection {
                built_in_toolsets: selections.builtin_toolsets.clone(),
                mcp_server_tools: selections.mcp_servers.clone(),
                extension_tools: selections.extensions.clone(),
            })
            .unwrap_or_default();

        let mut request_history = self.history.get_history(&data.chat_id);
        self.append_additional_context(&data, &mut request_history);

        self.history
            .add_message(&data.chat_id, Message::user(data.prompt.clone()));
        request_history.push(Message::user(data.prompt.clone()));

        let (emitter, cancel_token) = self.register(&message_id, &data.chat_id);
        let request = ChatRequest::new(self.service.clone(), data.prompt)
            .with_chat_mode(chat_mode)
            .with_tool_selection(tool_selection)
            .with_chat_history(request_history)
            .with_cancel_token(cancel_token);

        let session = self.clone();
        tokio::spawn(async move {
            session
                .service
                .handle_chat_request(request, emitter, ChatRequestOptions::default())
                .await;
            session.remove(&message_id);
        });
    }

    /// Fold file/cell context attachments into the request history,
    /// truncated to roughly 80% of the model context window. The durable
    /// history gets a pointer message, not the content.
    fn append_additional_context(&self, data: &ChatRequestData, request_history: &mut Vec<Message>) {
        if data.additional_context.is_empty() {
            return;
        }

        let token_limit = self
            .service
            .chat_model()
            .map(|model| model.context_window())
            .unwrap_or(100);
        let token_budget = (token_limit as f64 * 0.8) as usize;

        for context in &data.additional_context {
            let file_path = &context.file_path;
            let filename = file_path
                .rsplit('/')
                .next()
                .unwrap_or(file_path.as_str())
                .to_string();

            let cell_context = cell_context_note(context);
            let mut content = context.content.clone().unwrap_or_default();
            // Rough token estimate of four characters per token.
            if content.len() / 4 > token_budget {
                content.truncate(token_budget * 4);
                content.push_str("...");
            }

            let mut message_content = format!(
                "Use this as additional context: ```{}```. It is from current file: '{}' at path '{}'",
                content, filename, file_path
            );
            if let (Some(start_line), Some(end_line)) = (context.start_line, context.end_line) {
                if start_line >= 0 && end_line > 0 {
                    message_content
                        .push_str(&format!(", lines: {} - {}.", start_line, end_line));
                }
            }
            if !cell_context.is_empty() {
                message_content.push(' ');
                message_content.push_str(&cell_context);
            }
            request_history.push(Message::user(message_content));

            let mut pointer = format!(
                "This file was provided as additional context: '{}' at path '{}'.",
                filename, file_path
            );
            if !cell_context.is_empty() {
                pointer.push(' ');
                pointer.push_str(&cell_context);
            }
            self.history
                .add_message(&data.chat_id, Message::user(pointer));
        }
    }

    fn handle_generate_code(self: &Arc<Self>, message_id: String, data: GenerateCodeData) {
        if !data.prefix.is_empty() {
            self.history.add_message(
                &data.chat_id,
                Message::user(format!(
                    "This code section comes before the code section you will generate, use as \
                     context. Leading content: ```{}```",
                    data.prefix
                )),
            );
        }
        if !data.suffix.is_empty() {
            self.history.add_message(
                &data.chat_id,
                Message::user(format!(
                    "This code section comes after the code section you will generate, use as \
                     context. Trailing content: ```{}```",
                    data.suffix
                )),
            );
        }
        if !data.existing_code.is_empty() {
            self.history.add_message(
                &data.chat_id,
                Message::user(format!(
                    "You are asked to modify the existing code. Generate a replacement for this \
                     existing code : ```{}```",
                    data.existing_code
                )),
            );
        }
        self.history.add_message(
            &data.chat_id,
            Message::user(format!("Generate code for: {}", data.prompt)),
        );

        let (emitter, cancel_token) = self.register(&message_id, &data.chat_id);
        let request = ChatRequest::new(self.service.clone(), data.prompt)
            .with_chat_history(self.history.get_history(&data.chat_id))
            .with_cancel_token(cancel_token);
        let options = ChatRequestOptions {
            system_prompt: Some(generate_code_system_prompt(
                data.language.as_deref().unwrap_or("python"),
                !data.existing_code.is_empty(),
            )),
        };

        let session = self.clone();
        tokio::spawn(async move {
            session
                .service
                .handle_chat_request(request, emitter, options)
                .await;
            session.remove(&message_id);
        });
    }

    fn handle_inline_completion(self: &Arc<Self>, message_id: String, data: InlineCompletionData) {
        let (emitter, cancel_token) = self.register(&message_id, &data.chat_id);

        let session = self.clone();
        tokio::spawn(async move {
            session
                .run_inline_completion(&data, emitter.as_ref(), &cancel_token)
                .await;
            session.remove(&message_id);
        });
    }

    async fn run_inline_completion(
        &self,
        data: &InlineCompletionData,
        emitter: &WsResponseEmitter,
        cancel_token: &CancelToken,
    ) {
        let Some(model) = self.service.inline_completion_model() else {
            emitter.finish();
            return;
        };

        let allowed = self
            .service
            .chat_participant(&parse_prompt(&data.prefix).participant)
            .map(|participant| participant.allowed_context_providers())
            .unwrap_or_else(|| vec!["*".to_string()]);
        let context = self.service.completion_context(
            &ContextRequest {
                prefix: data.prefix.clone(),
                suffix: data.suffix.clone(),
                language: data.language.clone().unwrap_or_default(),
                filename: data.filename.clone().unwrap_or_default(),
            },
            &allowed,
        );

        if cancel_token.is_cancel_requested() {
            emitter.finish();
            return;
        }

        let prefix = if context.is_empty() {
            data.prefix.clone()
        } else {
            format!("{}\n{}", context.join("\n"), data.prefix)
        };

        let completions = match model
            .inline_completions(
                &prefix,
                &data.suffix,
                data.language.as_deref().unwrap_or_default(),
                data.filename.as_deref().unwrap_or_default(),
                Some(cancel_token.handle()),
            )
            .await
        {
            Ok(completions) => completions,
            Err(error) => {
                warn!(error = %error, "inline completion failed");
                emitter.finish();
                return;
            }
        };

        if cancel_token.is_cancel_requested() {
            emitter.finish();
            return;
        }

        emitter.stream(ResponseEvent::Raw(json!({"completions": completions})));
        emitter.finish();
    }
}

fn cell_context_note(context: &ContextItem) -> String {
    match &context.current_cell_contents {
        Some(cell) => format!(
            "This is a Jupyter notebook and currently selected cell input is: ```{}``` and \
             currently selected cell output is: ```{}```. If user asks a question about 'this' \
             cell then assume that user is referring to currently selected cell.",
            cell.input.clone().unwrap_or_default(),
            cell.output.clone().unwrap_or_default()
        ),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nbintel_core::config::{ConfigOptions, NbiConfig};
    use nbintel_protocol::ResponseType;
    use nbintel_provider::scripted::{ScriptedChatModel, ScriptedTurn};
    use nbintel_provider::{
        ChatModel, InlineCompletionModel, LlmProvider, ModelInfo, ProviderResult,
    };
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    /// Provider wrapper so a scripted model can be configured as the
    /// session's chat model.
    struct ScriptedProvider {
        model: Arc<ScriptedChatModel>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }
        fn name(&self) -> &str {
            "Scripted"
        }
        async fn chat_models(&self) -> Vec<ModelInfo> {
            vec![ModelInfo::new("scripted", "Scripted Model")]
        }
        async fn inline_completion_models(&self) -> Vec<ModelInfo> {
            vec![ModelInfo::new("scripted-inline", "Scripted Inline")]
        }
        async fn chat_model(&self, model_id: &str) -> Option<Arc<dyn ChatModel>> {
            (model_id == "scripted").then(|| self.model.clone() as Arc<dyn ChatModel>)
        }
        async fn inline_completion_model(
            &self,
            model_id: &str,
        ) -> Option<Arc<dyn InlineCompletionModel>> {
            (model_id == "scripted-inline")
                .then(|| Arc::new(FixedInlineModel) as Arc<dyn InlineCompletionModel>)
        }
    }

    struct FixedInlineModel;

    #[async_trait]
    impl InlineCompletionModel for FixedInlineModel {
        fn id(&self) -> String {
            "scripted-inline".to_string()
        }
        fn name(&self) -> String {
            "Scripted Inline".to_string()
        }
        fn context_window(&self) -> u32 {
            4096
        }
        async fn inline_completions(
            &self,
            _prefix: &str,
            _suffix: &str,
            _language: &str,
            _filename: &str,
            _abort: Option<tokio_util::sync::CancellationToken>,
        ) -> ProviderResult<String> {
            Ok("x = 42".to_string())
        }
    }

    async fn service_with_scripted_model(
        turns: Vec<ScriptedTurn>,
    ) -> (Arc<ChatService>, Arc<ScriptedChatModel>, tempfile::TempDir, tempfile::TempDir) {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        std::fs::write(
            user.path().join("config.json"),
            r#"{
                "chat_model": {"provider": "scripted", "model": "scripted"},
                "inline_completion_model": {"provider": "scripted", "model": "scripted-inline"}
            }"#,
        )
        .unwrap();
        let config = Arc::new(NbiConfig::new(ConfigOptions {
            server_root_dir: "/work".to_string(),
            env_dir: Some(env.path().to_path_buf()),
            user_dir: Some(user.path().to_path_buf()),
        }));

        let service = ChatService::new(config).await;
        let model = Arc::new(ScriptedChatModel::new(turns));
        service.register_llm_provider(Arc::new(ScriptedProvider {
            model: model.clone(),
        }));
        service.update_models_from_config().await;
        (service, model, env, user)
    }

    fn chat_request_envelope(message_id: &str, prompt: &str) -> RequestEnvelope {
        RequestEnvelope {
            id: message_id.to_string(),
            request_type: RequestType::ChatRequest,
            data: json!({"chatId": "chat-1", "prompt": prompt}),
        }
    }

    async fn recv_until_stream_end(
        rx: &mut mpsc::UnboundedReceiver<ResponseEnvelope>,
    ) -> Vec<ResponseEnvelope> {
        let mut envelopes = Vec::new();
        loop {
            let envelope = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for stream end")
                .expect("outbound channel closed");
            let is_end = envelope.response_type == ResponseType::StreamEnd;
            envelopes.push(envelope);
            if is_end {
                return envelopes;
            }
        }
    }

    fn nbi_content_type(envelope: &ResponseEnvelope) -> Option<String> {
        envelope
            .data
            .pointer("/choices/0/delta/nbiContent/type")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_test_participant_event_ordering_end_to_end() {
        let (service, _model, _env, _user) = service_with_scripted_model(vec![]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        session.handle_message(chat_request_envelope("msg-1", "@test /test"));

        let envelopes = recv_until_stream_end(&mut rx).await;
        let kinds: Vec<String> = envelopes
            .iter()
            .filter_map(nbi_content_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                "markdown", "markdown", "markdown", "markdown", "markdown", "progress",
                "html-frame", "anchor", "button",
            ]
        );
        assert_eq!(
            envelopes.last().unwrap().response_type,
            ResponseType::StreamEnd
        );
        // Every envelope is attributed to the addressed participant.
        assert!(envelopes.iter().all(|e| e.participant == "test"));

        // The handler entry was removed after completion.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_plain_chat_streams_and_records_history() {
        let (service, _model, _env, _user) = service_with_scripted_model(vec![ScriptedTurn::Text(
            "The answer is 42".to_string(),
        )])
        .await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        session.handle_message(chat_request_envelope("msg-1", "what is the answer?"));
        let envelopes = recv_until_stream_end(&mut rx).await;

        // Progress note then streamed markdown parts.
        let kinds: Vec<String> = envelopes.iter().filter_map(nbi_content_type).collect();
        assert_eq!(kinds[0], "progress");
        assert!(kinds[1..].iter().all(|k| k == "markdown-part"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let history = session.history().get_history("chat-1");
        // User prompt plus the reconciled assistant message.
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), "what is the answer?");
        assert_eq!(history[1].text(), "The answer is 42");
    }

    #[tokio::test]
    async fn test_cancel_routes_to_token() {
        let (service, _model, _env, _user) = service_with_scripted_model(vec![]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        // Register a handler directly, then cancel through the envelope.
        let (_emitter, cancel_token) = session.register("msg-9", "chat-1");
        session.handle_message(RequestEnvelope {
            id: "msg-9".to_string(),
            request_type: RequestType::CancelChatRequest,
            data: Value::Null,
        });
        assert!(cancel_token.is_cancel_requested());
    }

    #[tokio::test]
    async fn test_clear_chat_history() {
        let (service, _model, _env, _user) = service_with_scripted_model(vec![]).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        session
            .history()
            .add_message("chat-1", Message::user("hello"));
        session.handle_message(RequestEnvelope {
            id: "msg-1".to_string(),
            request_type: RequestType::ClearChatHistory,
            data: Value::Null,
        });
        assert!(session.history().get_history("chat-1").is_empty());
    }

    #[tokio::test]
    async fn test_inline_completion_round_trip() {
        let (service, _model, _env, _user) = service_with_scripted_model(vec![]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        session.handle_message(RequestEnvelope {
            id: "msg-1".to_string(),
            request_type: RequestType::InlineCompletionRequest,
            data: json!({"chatId": "chat-1", "prefix": "def f():\n    ", "suffix": ""}),
        });

        let envelopes = recv_until_stream_end(&mut rx).await;
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].data["completions"], "x = 42");
    }

    #[tokio::test]
    async fn test_generate_code_uses_language_prompt() {
        let (service, model, _env, _user) = service_with_scripted_model(vec![ScriptedTurn::Text(
            "print('generated')".to_string(),
        )])
        .await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        session.handle_message(RequestEnvelope {
            id: "msg-1".to_string(),
            request_type: RequestType::GenerateCode,
            data: json!({
                "chatId": "chat-1",
                "prompt": "sum a list",
                "prefix": "import math",
                "suffix": "",
                "existingCode": "",
                "language": "python",
            }),
        });

        let _ = recv_until_stream_end(&mut rx).await;
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0]
            .system_prompt
            .as_ref()
            .unwrap()
            .contains("'python'"));
        // The leading-context message made it into the model request.
        assert!(calls[0]
            .messages
            .iter()
            .any(|m| m.text().contains("import math")));
    }

    #[tokio::test]
    async fn test_additional_context_goes_to_request_not_history() {
        let (service, model, _env, _user) = service_with_scripted_model(vec![ScriptedTurn::Text(
            "ok".to_string(),
        )])
        .await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(service, tx);

        session.handle_message(RequestEnvelope {
            id: "msg-1".to_string(),
            request_type: RequestType::ChatRequest,
            data: json!({
                "chatId": "chat-1",
                "prompt": "explain this",
                "additionalContext": [{
                    "filePath": "notebooks/analysis.ipynb",
                    "content": "print('cell content')",
                    "startLine": 1,
                    "endLine": 3,
                }],
            }),
        });
        let _ = recv_until_stream_end(&mut rx).await;

        // The model saw the full context content.
        let calls = model.calls();
        assert!(calls[0]
            .messages
            .iter()
            .any(|m| m.text().contains("print('cell content')")));

        // The durable history only keeps the pointer message.
        let history = session.history().get_history("chat-1");
        assert!(history
            .iter()
            .any(|m| m.text().contains("provided as additional context")));
        assert!(!history.iter().any(|m| m.text().contains("print('cell content')")));
    }
}
