//! Test doubles shared by the core unit tests.

use crate::config::{ConfigOptions, NbiConfig};
use crate::error::CoreResult;
use crate::events::ResponseEvent;
use crate::reply::ReplyRouter;
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::service::Host;
use crate::tool::{BoxedTool, Toolset};
use async_trait::async_trait;
use nbintel_mcp::McpServer;
use nbintel_provider::{ChatModel, InlineCompletionModel, Message};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A response channel that records everything streamed into it.
pub struct RecordingChannel {
    message_id: String,
    participant: Mutex<String>,
    events: Mutex<Vec<ResponseEvent>>,
    finishes: AtomicUsize,
    user_input: ReplyRouter,
    ui_replies: ReplyRouter,
    ui_command_log: Mutex<Vec<(String, Value)>>,
    ui_command_result: Mutex<Value>,
    auto_confirm: Mutex<Option<bool>>,
}

impl RecordingChannel {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            participant: Mutex::new(String::new()),
            events: Mutex::new(Vec::new()),
            finishes: AtomicUsize::new(0),
            user_input: ReplyRouter::new(),
            ui_replies: ReplyRouter::new(),
            ui_command_log: Mutex::new(Vec::new()),
            ui_command_result: Mutex::new(json!({"path": "untitled.ipynb"})),
            auto_confirm: Mutex::new(None),
        }
    }

    /// Answer confirmations immediately with the given decision.
    pub fn auto_confirm(&self, confirmed: bool) {
        *self.auto_confirm.lock().unwrap() = Some(confirmed);
    }

    /// Set the canned result for UI command round-trips.
    pub fn set_ui_command_result(&self, result: Value) {
        *self.ui_command_result.lock().unwrap() = result;
    }

    pub fn events(&self) -> Vec<ResponseEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn finish_count(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    pub fn ui_command_log(&self) -> Vec<(String, Value)> {
        self.ui_command_log.lock().unwrap().clone()
    }

    pub fn markdown_contents(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ResponseEvent::Markdown { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn markdown_part_contents(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ResponseEvent::MarkdownPart { content } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn progress_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ResponseEvent::Progress { .. }))
            .count()
    }

    pub fn confirmation_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ResponseEvent::Confirmation { .. }))
            .count()
    }
}

#[async_trait]
impl ResponseChannel for RecordingChannel {
    fn message_id(&self) -> String {
        self.message_id.clone()
    }

    fn participant(&self) -> String {
        self.participant.lock().unwrap().clone()
    }

    fn set_participant(&self, participant_id: &str) {
        *self.participant.lock().unwrap() = participant_id.to_string();
    }

    fn stream(&self, event: ResponseEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn finish(&self) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }

    async fn run_ui_command(&self, command: &str, args: Value) -> CoreResult<Value> {
        self.ui_command_log
            .lock()
            .unwrap()
            .push((command.to_string(), args));
        Ok(self.ui_command_result.lock().unwrap().clone())
    }

    async fn wait_for_user_input(&self, callback_id: &str) -> CoreResult<Value> {
        if let Some(confirmed) = *self.auto_confirm.lock().unwrap() {
            return Ok(json!({"confirmed": confirmed}));
        }
        self.user_input.wait(callback_id).await
    }

    fn on_user_input(&self, data: Value) {
        if let Some(callback_id) = data.get("callback_id").and_then(Value::as_str) {
            self.user_input
                .resolve(callback_id, data.get("data").cloned().unwrap_or(Value::Null));
        }
    }

    fn on_run_ui_command_response(&self, data: Value) {
        if let Some(callback_id) = data.get("callback_id").and_then(Value::as_str) {
            self.ui_replies
                .resolve(callback_id, data.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

/// A host with an optional scripted model and throwaway config dirs.
pub struct TestHost {
    chat_model: Option<Arc<dyn ChatModel>>,
    config: Arc<NbiConfig>,
    builtin_toolsets: Vec<Toolset>,
    _env_dir: tempfile::TempDir,
    _user_dir: tempfile::TempDir,
}

impl TestHost {
    pub fn with_model<M: ChatModel + 'static>(model: Arc<M>) -> Arc<Self> {
        Self::build(Some(model as Arc<dyn ChatModel>))
    }

    pub fn without_model() -> Arc<Self> {
        Self::build(None)
    }

    fn build(chat_model: Option<Arc<dyn ChatModel>>) -> Arc<Self> {
        let env_dir = tempfile::tempdir().unwrap();
        let user_dir = tempfile::tempdir().unwrap();
        let config = Arc::new(NbiConfig::new(ConfigOptions {
            server_root_dir: "/work".to_string(),
            env_dir: Some(env_dir.path().to_path_buf()),
            user_dir: Some(user_dir.path().to_path_buf()),
        }));
        Arc::new(Self {
            chat_model,
            config,
            builtin_toolsets: crate::builtin::built_in_toolsets(),
            _env_dir: env_dir,
            _user_dir: user_dir,
        })
    }

    pub fn server_root_dir(&self) -> &str {
        self.config.server_root_dir()
    }

    /// Build a request carrying this host, with the prompt as the only
    /// history entry.
    pub fn request(self: &Arc<Self>, prompt: &str) -> ChatRequest {
        ChatRequest::new(self.clone(), prompt)
            .with_chat_history(vec![Message::user(prompt)])
    }
}

impl Host for TestHost {
    fn chat_model(&self) -> Option<Arc<dyn ChatModel>> {
        self.chat_model.clone()
    }

    fn inline_completion_model(&self) -> Option<Arc<dyn InlineCompletionModel>> {
        None
    }

    fn config(&self) -> Arc<NbiConfig> {
        self.config.clone()
    }

    fn builtin_toolset(&self, id: &str) -> Option<Toolset> {
        self.builtin_toolsets.iter().find(|t| t.id == id).cloned()
    }

    fn builtin_toolsets(&self) -> Vec<Toolset> {
        self.builtin_toolsets.clone()
    }

    fn mcp_server(&self, _name: &str) -> Option<Arc<McpServer>> {
        None
    }

    fn extension_toolset(&self, _extension_id: &str, _toolset_id: &str) -> Option<Toolset> {
        None
    }

    fn extension_tool(
        &self,
        _extension_id: &str,
        _toolset_id: &str,
        _tool_name: &str,
    ) -> Option<BoxedTool> {
        None
    }
}
