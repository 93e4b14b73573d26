//! The chat participant contract.
//!
//! A participant is a named persona selectable with `@id`. It owns a
//! tool set and the decision of which mode to run: a direct completion,
//! deterministic command handling, or the tool-calling loop. New
//! variants implement this trait; there is no deeper hierarchy.

use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::tool::BoxedTool;
use async_trait::async_trait;

/// A slash command offered by a participant.
#[derive(Debug, Clone)]
pub struct ChatCommand {
    pub name: String,
    pub description: String,
}

impl ChatCommand {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Per-request options passed alongside dispatch.
#[derive(Debug, Clone, Default)]
pub struct ChatRequestOptions {
    /// System prompt override; participants use their own when absent.
    pub system_prompt: Option<String>,
}

/// A named persona owning tools, commands and chat handling behavior.
#[async_trait]
pub trait ChatParticipant: Send + Sync {
    /// Participant id, addressable as `@id`.
    fn id(&self) -> String;

    /// Human-readable name.
    fn name(&self) -> String;

    /// Description shown in the participant list.
    fn description(&self) -> String {
        self.name()
    }

    /// Icon, as a data URL.
    fn icon_path(&self) -> Option<String> {
        None
    }

    /// Slash commands this participant recognizes.
    fn commands(&self) -> Vec<ChatCommand> {
        Vec::new()
    }

    /// Tools for this request. The active set may depend on the request
    /// mode and tool selections.
    async fn tools(&self, _request: &ChatRequest) -> Vec<BoxedTool> {
        Vec::new()
    }

    /// Context provider ids this participant accepts; `*` means any.
    fn allowed_context_providers(&self) -> Vec<String> {
        vec!["*".to_string()]
    }

    /// Handle a routed chat request to completion. Every path must end
    /// with `response.finish()`.
    async fn handle_chat_request(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    );
}
