//! LiteLLM-compatible provider implementation.
//!
//! LiteLLM gateways expose the OpenAI chat-completions wire format behind
//! a configurable base URL, so this provider reuses the OpenAI-compatible
//! models under its own provider id. The base URL property is mandatory
//! here; there is no hosted default to fall back to.

use crate::{
    model::ModelInfo,
    openai_compatible::{OpenAiCompatibleChatModel, OpenAiCompatibleInlineCompletionModel},
    ChatModel, InlineCompletionModel, LlmProvider,
};
use async_trait::async_trait;
use std::sync::Arc;

/// LiteLLM-compatible provider.
pub struct LiteLlmCompatibleProvider {
    chat: Arc<OpenAiCompatibleChatModel>,
    inline: Arc<OpenAiCompatibleInlineCompletionModel>,
}

impl LiteLlmCompatibleProvider {
    pub fn new() -> Self {
        Self {
            chat: Arc::new(OpenAiCompatibleChatModel::new("litellm-compatible", None)),
            inline: Arc::new(OpenAiCompatibleInlineCompletionModel::new(
                "litellm-compatible",
                None,
            )),
        }
    }

    /// Set a property on the chat model.
    pub fn set_chat_property(&self, id: &str, value: &str) {
        self.chat.set_property(id, value);
    }

    /// Set a property on the inline completion model.
    pub fn set_inline_property(&self, id: &str, value: &str) {
        self.inline.set_property(id, value);
    }
}

impl Default for LiteLlmCompatibleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for LiteLlmCompatibleProvider {
    fn id(&self) -> &str {
        "litellm-compatible"
    }

    fn name(&self) -> &str {
        "LiteLLM Compatible"
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
