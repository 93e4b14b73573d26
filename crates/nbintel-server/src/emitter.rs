//! Wire translation of response events.
//!
//! The emitter implements the core response-channel contract over the
//! session's outbound queue. Every structured event becomes a
//! stream-message envelope whose payload mimics a provider delta with an
//! `nbiContent` wrapper, so the front end has one parsing path whatever
//! the originating event type. Raw model chunks pass through unchanged.

use async_trait::async_trait;
use nbintel_core::reply::ReplyRouter;
use nbintel_core::{CoreError, CoreResult, ResponseChannel, ResponseEvent};
use nbintel_core::ChatHistory;
use nbintel_protocol::{ResponseEnvelope, RunUiCommandData, UiCommandResponseData, UserInputData};
use nbintel_provider::Message;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Per-message-id response emitter bound to one WebSocket session.
pub struct WsResponseEmitter {
    chat_id: String,
    message_id: String,
    participant: Mutex<String>,
    history: Arc<ChatHistory>,
    outbound: mpsc::UnboundedSender<ResponseEnvelope>,
    streamed_contents: Mutex<Vec<String>>,
    user_input: ReplyRouter,
    ui_replies: ReplyRouter,
}

impl WsResponseEmitter {
    pub fn new(
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
        history: Arc<ChatHistory>,
        outbound: mpsc::UnboundedSender<ResponseEnvelope>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
            participant: Mutex::new(String::new()),
            history,
            outbound,
            streamed_contents: Mutex::new(Vec::new()),
            user_input: ReplyRouter::new(),
            ui_replies: ReplyRouter::new(),
        }
    }

    fn send(&self, envelope: ResponseEnvelope) {
        // A send failure means the socket is gone; events are dropped.
        let _ = self.outbound.send(envelope);
    }

    /// Wrap an `nbiContent` payload in the provider delta shape.
    fn nbi_content(&self, content_type: &str, content: Value) -> Value {
        json!({
            "choices": [{
                "delta": {
                    "nbiContent": {"type": content_type, "content": content},
                    "content": "",
                    "role": "assistant",
                }
            }]
        })
    }

    fn translate(&self, event: &ResponseEvent) -> Value {
        match event {
            ResponseEvent::Markdown { content, detail } => {
                self.history
                    .add_message(&self.chat_id, Message::assistant(content.clone()));
                json!({
                    "choices": [{
                        "delta": {
                            "nbiContent": {
                                "type": event.data_type(),
                                "content": content,
                                "detail": detail,
                            },
                            "content": "",
                            "role": "assistant",
                        }
                    }]
                })
            }
            ResponseEvent::MarkdownPart { content } => {
                self.streamed_contents.lock().unwrap().push(content.clone());
                self.nbi_content(event.data_type(), json!(content))
            }
            ResponseEvent::Image { content } => {
                self.nbi_content(event.data_type(), json!(content))
            }
            ResponseEvent::HtmlFrame { source, height } => self.nbi_content(
                event.data_type(),
                json!({"source": source, "height": height}),
            ),
            ResponseEvent::Anchor { uri, title } => {
                self.nbi_content(event.data_type(), json!({"uri": uri, "title": title}))
            }
            ResponseEvent::Button {
                title,
                command_id,
                args,
            } => self.nbi_content(
                event.data_type(),
                json!({"title": title, "commandId": command_id, "args": args}),
            ),
            ResponseEvent::Progress { title } => {
                self.nbi_content(event.data_type(), json!(title))
            }
            ResponseEvent::Confirmation {
                title,
                message,
                confirm_args,
                cancel_args,
                confirm_label,
                cancel_label,
            } => self.nbi_content(
                event.data_type(),
                json!({
                    "title": title,
                    "message": message,
                    "confirmArgs": confirm_args,
                    "cancelArgs": cancel_args,
                    "confirmLabel": confirm_label.clone().unwrap_or_else(|| "Approve".to_string()),
                    "cancelLabel": cancel_label.clone().unwrap_or_else(|| "Cancel".to_string()),
                }),
            ),
            ResponseEvent::Raw(value) => {
                if let Some(part) = value
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                {
                    self.streamed_contents.lock().unwrap().push(part.to_string());
                }
                value.clone()
            }
        }
    }
}

#[async_trait]
impl ResponseChannel for WsResponseEmitter {
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
        let data = self.translate(&event);
        self.send(ResponseEnvelope::stream_message(
            self.message_id.clone(),
            self.participant(),
            data,
        ));
    }

    fn finish(&self) {
        let streamed = {
            let mut contents = self.streamed_contents.lock().unwrap();
            let joined = contents.join("");
            contents.clear();
            joined
        };
        if !streamed.is_empty() {
            self.history
                .add_message(&self.chat_id, Message::assistant(streamed));
        }
        self.send(ResponseEnvelope::stream_end(
            self.message_id.clone(),
            self.participant(),
        ));
    }

    async fn run_ui_command(&self, command: &str, args: Value) -> CoreResult<Value> {
        let callback_id = uuid::Uuid::new_v4().to_string();
        let data = RunUiCommandData {
            callback_id: callback_id.clone(),
            command_id: command.to_string(),
            args,
        };
        self.send(ResponseEnvelope::run_ui_command(
            self.message_id.clone(),
            self.participant(),
            serde_json::to_value(&data).map_err(CoreError::from)?,
        ));

        self.ui_replies.wait(&callback_id).await
    }

    async fn wait_for_user_input(&self, callback_id: &str) -> CoreResult<Value> {
        self.user_input.wait(callback_id).await
    }

    fn on_user_input(&self, data: Value) {
        match serde_json::from_value::<UserInputData>(data) {
            Ok(input) => {
                self.user_input.resolve(&input.callback_id, input.data);
            }
            Err(error) => tracing::warn!(error = %error, "invalid user input payload"),
        }
    }

    fn on_run_ui_command_response(&self, data: Value) {
        match serde_json::from_value::<UiCommandResponseData>(data) {
            Ok(reply) => {
                self.ui_replies.resolve(&reply.callback_id, reply.result);
            }
            Err(error) => tracing::warn!(error = %error, "invalid ui command response payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbintel_protocol::ResponseType;

    fn emitter_with_channel() -> (
        Arc<WsResponseEmitter>,
        Arc<ChatHistory>,
        mpsc::UnboundedReceiver<ResponseEnvelope>,
    ) {
        let history = Arc::new(ChatHistory::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Arc::new(WsResponseEmitter::new("chat-1", "msg-1", history.clone(), tx));
        emitter.set_participant("default");
        (emitter, history, rx)
    }

    #[tokio::test]
    async fn test_markdown_wire_shape_and_history() {
        let (emitter, history, mut rx) = emitter_with_channel();

        emitter.stream(ResponseEvent::markdown("**hello**"));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.response_type, ResponseType::StreamMessage);
        assert_eq!(envelope.id, "msg-1");
        assert_eq!(envelope.participant, "default");
        let delta = &envelope.data["choices"][0]["delta"];
        assert_eq!(delta["nbiContent"]["type"], "markdown");
        assert_eq!(delta["nbiContent"]["content"], "**hello**");
        assert_eq!(delta["content"], "");
        assert_eq!(delta["role"], "assistant");

        // Markdown is recorded into history immediately.
        let messages = history.get_history("chat-1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "**hello**");
    }

    #[tokio::test]
    async fn test_finish_reconciles_streamed_parts() {
        let (emitter, history, mut rx) = emitter_with_channel();

        emitter.stream(ResponseEvent::markdown_part("Hello "));
        emitter.stream(ResponseEvent::markdown_part("world"));
        emitter.finish();

        // Two stream messages then a stream-end.
        let _ = rx.recv().await.unwrap();
        let _ = rx.recv().await.unwrap();
        let end = rx.recv().await.unwrap();
        assert_eq!(end.response_type, ResponseType::StreamEnd);

        let messages = history.get_history("chat-1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "Hello world");
    }

    #[tokio::test]
    async fn test_raw_chunks_accumulate() {
        let (emitter, history, mut rx) = emitter_with_channel();

        let chunk = json!({"choices": [{"delta": {"role": "assistant", "content": "abc"}}]});
        emitter.stream(ResponseEvent::Raw(chunk.clone()));
        emitter.finish();

        let envelope = rx.recv().await.unwrap();
        // Raw chunks pass through unchanged.
        assert_eq!(envelope.data, chunk);

        let messages = history.get_history("chat-1");
        assert_eq!(messages[0].text(), "abc");
    }

    #[tokio::test]
    async fn test_confirmation_labels_defaulted() {
        let (emitter, _history, mut rx) = emitter_with_channel();

        emitter.stream(ResponseEvent::Confirmation {
            title: "Approve".to_string(),
            message: "Run?".to_string(),
            confirm_args: json!({}),
            cancel_args: json!({}),
            confirm_label: None,
            cancel_label: None,
        });

        let envelope = rx.recv().await.unwrap();
        let content = &envelope.data["choices"][0]["delta"]["nbiContent"]["content"];
        assert_eq!(content["confirmLabel"], "Approve");
        assert_eq!(content["cancelLabel"], "Cancel");
    }

    #[tokio::test]
    async fn test_run_ui_command_round_trip() {
        let (emitter, _history, mut rx) = emitter_with_channel();

        let runner = emitter.clone();
        let task =
            tokio::spawn(async move { runner.run_ui_command("nbintel:create-new-file", json!({})).await });

        // The envelope carries a fresh correlation id.
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.response_type, ResponseType::RunUiCommand);
        let callback_id = envelope.data["callback_id"].as_str().unwrap().to_string();
        assert_eq!(envelope.data["commandId"], "nbintel:create-new-file");

        // Reply with the correlated result.
        emitter.on_run_ui_command_response(json!({
            "callback_id": callback_id,
            "result": {"path": "new.py"},
        }));

        let result = task.await.unwrap().unwrap();
        assert_eq!(result["path"], "new.py");
    }

    #[tokio::test]
    async fn test_user_input_round_trip() {
        let (emitter, _history, _rx) = emitter_with_channel();

        let waiter = emitter.clone();
        let task = tokio::spawn(async move { waiter.wait_for_user_input("call_7").await });
        tokio::task::yield_now().await;

        // A reply with the wrong id is dropped; the right one resolves.
        emitter.on_user_input(json!({"callback_id": "other", "data": {"confirmed": true}}));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        emitter.on_user_input(json!({"callback_id": "call_7", "data": {"confirmed": false}}));

        let value = task.await.unwrap().unwrap();
        assert_eq!(value["confirmed"], false);
    }

    #[tokio::test]
    async fn test_finish_without_streamed_text_keeps_history_clean() {
        let (emitter, history, mut rx) = emitter_with_channel();
        emitter.finish();

        let end = rx.recv().await.unwrap();
        assert_eq!(end.response_type, ResponseType::StreamEnd);
        assert!(history.get_history("chat-1").is_empty());
    }
}
