//! Scripted chat model for tests.
//!
//! Each call to `completions` pops the next scripted turn and replays it
//! as a chunk stream. The options of every call are recorded so tests
//! can assert on tool-choice policy and system prompts.

use crate::{
    message::Message, ChatModel, CompletionChunk, CompletionOptions, CompletionStream,
    FinishReason, ProviderResult, ToolChoice,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Plain text content.
    Text(String),
    /// A batch of tool calls: (id, name, arguments).
    ToolCalls(Vec<(Option<String>, String, Value)>),
    /// Fail the call.
    Error(String),
}

/// Recorded snapshot of one call's options.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_choice: ToolChoice,
    pub tool_names: Vec<String>,
    pub system_prompt: Option<String>,
}

/// A chat model that replays a fixed script.
pub struct ScriptedChatModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedChatModel {
    /// Create a model with a script of turns.
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append a turn to the script.
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    /// All recorded calls so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of completion calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn id(&self) -> String {
        "scripted".to_string()
    }

    fn name(&self) -> String {
        "Scripted Model".to_string()
    }

    fn context_window(&self) -> u32 {
        4096
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn completions(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> ProviderResult<CompletionStream> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages,
            tool_choice: options.tool_choice.clone(),
            tool_names: options.tools.iter().map(|t| t.name.clone()).collect(),
            system_prompt: options.system_prompt.clone(),
        });

        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::Text("Scripted response".to_string()));

        let chunks: Vec<ProviderResult<CompletionChunk>> = match turn {
            ScriptedTurn::Text(text) => vec![
                Ok(CompletionChunk::TextDelta(text)),
                Ok(CompletionChunk::Finish(FinishReason::EndTurn)),
            ],
            ScriptedTurn::ToolCalls(calls) => {
                let mut chunks: Vec<ProviderResult<CompletionChunk>> = calls
                    .into_iter()
                    .map(|(id, name, arguments)| {
                        Ok(CompletionChunk::ToolCall {
                            id,
                            name,
                            arguments,
                        })
                    })
                    .collect();
                chunks.push(Ok(CompletionChunk::Finish(FinishReason::ToolUse)));
                chunks
            }
            ScriptedTurn::Error(message) => {
                vec![Err(crate::ProviderError::internal(message))]
            }
        };

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect_turn;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let model = ScriptedChatModel::new(vec![
            ScriptedTurn::ToolCalls(vec![(
                Some("call_1".to_string()),
                "convert".to_string(),
                json!({"temperature": 100}),
            )]),
            ScriptedTurn::Text("done".to_string()),
        ]);

        let turn = collect_turn(
            model
                .completions(vec![Message::user("go")], CompletionOptions::default())
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(turn.tool_calls.len(), 1);

        let turn = collect_turn(
            model
                .completions(vec![Message::user("go")], CompletionOptions::default())
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(turn.content, "done");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_records_tool_choice() {
        let model = ScriptedChatModel::new(vec![ScriptedTurn::Text("hi".to_string())]);
        let options = CompletionOptions {
            tool_choice: ToolChoice::Required,
            ..Default::default()
        };
        let _ = model.completions(vec![], options).await.unwrap();

        let calls = model.calls();
        assert_eq!(calls[0].tool_choice, ToolChoice::Required);
    }

    #[tokio::test]
    async fn test_empty_script_falls_back() {
        let model = ScriptedChatModel::new(vec![]);
        let turn = collect_turn(
            model
                .completions(vec![], CompletionOptions::default())
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(turn.content, "Scripted response");
    }
}
