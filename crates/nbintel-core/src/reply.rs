//! Correlation-id reply routing.
//!
//! Confirmation prompts and UI-command round-trips suspend until a reply
//! with a matching correlation id arrives from the front end. Each wait
//! registers a oneshot resolved by the reply; a waiter resumes exactly
//! once and stale or repeated replies are dropped.

use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Routes replies to suspended waiters by correlation id.
#[derive(Debug, Default)]
pub struct ReplyRouter {
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl ReplyRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until a reply for `callback_id` arrives.
    pub async fn wait(&self, callback_id: &str) -> CoreResult<Value> {
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(callback_id.to_string(), sender);

        receiver
            .await
            .map_err(|_| CoreError::ReplyChannelClosed(callback_id.to_string()))
    }

    /// Resolve the waiter registered for `callback_id`. Returns whether a
    /// waiter was found; replies with no waiter are dropped.
    pub fn resolve(&self, callback_id: &str, value: Value) -> bool {
        let sender = self.pending.lock().unwrap().remove(callback_id);
        match sender {
            Some(sender) => sender.send(value).is_ok(),
            None => false,
        }
    }

    /// Drop all waiters, failing their waits.
    pub fn close(&self) {
        self.pending.lock().unwrap().clear();
    }
}
