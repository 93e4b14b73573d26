//! Bounded per-conversation chat history.
//!
//! The store is the sole owner of conversation context across turns;
//! request handlers receive a defensive copy, never the live list.

use crate::prompt::parse_prompt;
use nbintel_provider::Message;
use std::collections::HashMap;
use std::sync::Mutex;

/// Maximum messages kept per conversation.
pub const MAX_MESSAGES: usize = 10;

/// History of chat messages keyed by conversation id.
///
/// Addressing a different `@participant` starts a fresh context: when a
/// new user message resolves to a different participant than the
/// previous user message, the conversation is cleared before appending.
#[derive(Debug, Default)]
pub struct ChatHistory {
    messages: Mutex<HashMap<String, Vec<Message>>>,
}

impl ChatHistory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear one conversation, or all of them when `chat_id` is None.
    /// Returns whether anything was removed.
    pub fn clear(&self, chat_id: Option<&str>) -> bool {
        let mut messages = self.messages.lock().unwrap();
        match chat_id {
            None => {
                messages.clear();
                true
            }
            Some(chat_id) => messages.remove(chat_id).is_some(),
        }
    }

    /// Append a message, enforcing the participant-switch reset and the
    /// length cap.
    pub fn add_message(&self, chat_id: &str, message: Message) {
        let mut messages = self.messages.lock().unwrap();
        let conversation = messages.entry(chat_id.to_string()).or_default();

        if message.is_user() {
            let prev_user = conversation.iter().rev().find(|m| m.is_user());
            if let Some(prev_user) = prev_user {
                let current = parse_prompt(message.text());
                let previous = parse_prompt(prev_user.text());
                if current.participant != previous.participant {
                    conversation.clear();
                }
            }
        }

        conversation.push(message);
        if conversation.len() > MAX_MESSAGES {
            let excess = conversation.len() - MAX_MESSAGES;
            conversation.drain(..excess);
        }
    }

    /// Get a copy of the conversation, oldest first.
    pub fn get_history(&self, chat_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }
}
