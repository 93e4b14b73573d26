//! The response channel contract.
//!
//! A response channel is the per-message-id event sink for one logical
//! response. The transport layer implements it, translating structured
//! events to wire envelopes, reconciling streamed text with the history
//! store on finish, and servicing UI-command round-trips.

use crate::error::CoreResult;
use crate::events::ResponseEvent;
use async_trait::async_trait;
use serde_json::Value;

/// Per-response event sink and round-trip broker.
#[async_trait]
pub trait ResponseChannel: Send + Sync {
    /// The message id this response belongs to.
    fn message_id(&self) -> String;

    /// Participant attributed on outgoing envelopes.
    fn participant(&self) -> String;

    /// Set the participant attribution. Called once by the router.
    fn set_participant(&self, participant_id: &str);

    /// Publish an event.
    fn stream(&self, event: ResponseEvent);

    /// Terminate the response. Appends the accumulated streamed text to
    /// history as a single assistant message, then emits stream-end.
    /// Safe to call once per response; every processing path must reach
    /// it, including cancellation and error paths.
    fn finish(&self);

    /// Ask the front end to run a UI command and suspend until the
    /// correlated result arrives.
    async fn run_ui_command(&self, command: &str, args: Value) -> CoreResult<Value>;

    /// Suspend until user input correlated by `callback_id` arrives.
    async fn wait_for_user_input(&self, callback_id: &str) -> CoreResult<Value>;

    /// Deliver a chat-user-input payload `{callback_id, data}`.
    fn on_user_input(&self, data: Value);

    /// Deliver a run-ui-command-response payload `{callback_id, result}`.
    fn on_run_ui_command_response(&self, data: Value);
}
