//! The multi-round tool-calling loop.
//!
//! One round: send the conversation plus tool schemas to the model,
//! stream any plain content, drain the returned tool calls strictly in
//! order (running the confirmation sub-protocol per call), append the
//! results to the conversation, and go again until the model returns
//! plain content only. Tool choice can be forced on the first round; it
//! always reverts to auto afterwards so a forced policy cannot loop
//! forever.
//!
//! Failures inside a round are contained here: the user gets an apology
//! message and the response is finished. The loop never leaves a
//! response channel open, including on cancellation.

use crate::events::ResponseEvent;
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::service::Host;
use crate::tool::{bind_tool_args, tool_definition, BoxedTool};
use futures::StreamExt;
use nbintel_provider::{
    collect_turn, CompletionChunk, CompletionOptions, Message, ProviderError, ToolCall, ToolChoice,
};
use nbintel_util::Identifier;
use serde_json::{json, Value};
use tracing::{error, warn};

/// Options for a tool loop run.
#[derive(Debug, Clone, Default)]
pub struct ToolLoopOptions {
    /// System prompt inserted ahead of the conversation.
    pub system_prompt: Option<String>,
    /// Tool-choice policy for the first round only.
    pub tool_choice: ToolChoice,
}

const MODEL_NOT_SET: &str = "Chat model is not set!";
const UNKNOWN_TOOL_MESSAGE: &str =
    "Oops! Failed to find requested tool. Please try again with a different prompt.";
const BAD_ARGUMENTS_MESSAGE: &str =
    "Oops! There was a problem handling tool request. Please try again with a different prompt.";
const LOOP_FAILURE_MESSAGE: &str = "Oops! I am sorry, there was a problem generating response \
     with tools. Please try again. You can check server logs for more details.";
const CHAT_FAILURE_MESSAGE: &str =
    "Oops! There was a problem handling chat request. Please try again with a different prompt.";

/// Issue a single streaming completion with no tools and finish the
/// response. Text deltas are forwarded as markdown fragments.
pub async fn stream_completion(
    request: &ChatRequest,
    response: &dyn ResponseChannel,
    system_prompt: Option<String>,
) {
    let Some(model) = request.host.chat_model() else {
        response.stream(ResponseEvent::markdown(MODEL_NOT_SET));
        response.finish();
        return;
    };

    if request.cancel_token.is_cancel_requested() {
        response.finish();
        return;
    }

    let options = CompletionOptions {
        system_prompt,
        abort: Some(request.cancel_token.handle()),
        ..Default::default()
    };

    let mut stream = match model.completions(request.chat_history.clone(), options).await {
        Ok(stream) => stream,
        Err(error) => {
            error!(error = %error, "chat completion failed");
            response.stream(ResponseEvent::markdown(CHAT_FAILURE_MESSAGE));
            response.finish();
            return;
        }
    };

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(CompletionChunk::TextDelta(delta)) => {
                response.stream(ResponseEvent::markdown_part(delta));
            }
            Ok(CompletionChunk::ToolCall { .. }) => {}
            Ok(CompletionChunk::Finish(_)) => break,
            Err(ProviderError::Cancelled) => break,
            Err(error) => {
                error!(error = %error, "chat completion stream failed");
                response.stream(ResponseEvent::markdown(CHAT_FAILURE_MESSAGE));
                break;
            }
        }
    }

    response.finish();
}

/// Run the tool-calling loop to completion.
///
/// With no tools this degenerates to a single streaming completion.
/// Cancellation is checked before every model call and before every
/// dequeued tool call; it unwinds to `finish()` without error.
pub async fn run_tool_call_loop(
    tools: &[BoxedTool],
    request: &ChatRequest,
    response: &dyn ResponseChannel,
    options: ToolLoopOptions,
    tool_context: &Value,
) {
    if tools.is_empty() {
        stream_completion(request, response, options.system_prompt).await;
        return;
    }

    let Some(model) = request.host.chat_model() else {
        response.stream(ResponseEvent::markdown(MODEL_NOT_SET));
        response.finish();
        return;
    };

    let mut messages = request.chat_history.clone();
    if let Some(system_prompt) = &options.system_prompt {
        messages.insert(0, Message::system(system_prompt.clone()));
    }

    let tool_definitions: Vec<_> = tools.iter().map(|t| tool_definition(t.as_ref())).collect();
    let mut tool_choice = options.tool_choice;

    loop {
        if request.cancel_token.is_cancel_requested() {
            response.finish();
            return;
        }

        let completion_options = CompletionOptions {
            system_prompt: None,
            tools: tool_definitions.clone(),
            tool_choice: tool_choice.clone(),
            abort: Some(request.cancel_token.handle()),
        };

        let turn = match model.completions(messages.clone(), completion_options).await {
            Ok(stream) => match collect_turn(stream).await {
                Ok(turn) => turn,
                Err(ProviderError::Cancelled) => {
                    response.finish();
                    return;
                }
                Err(error) => {
                    error!(error = %error, "tool loop completion stream failed");
                    response.stream(ResponseEvent::markdown(LOOP_FAILURE_MESSAGE));
                    response.finish();
                    return;
                }
            },
            Err(error) => {
                error!(error = %error, "tool loop completion failed");
                response.stream(ResponseEvent::markdown(LOOP_FAILURE_MESSAGE));
                response.finish();
                return;
            }
        };

        // Forced tool choice applies to the first round only.
        tool_choice = ToolChoice::Auto;

        if !turn.content.is_empty() {
            response.stream(ResponseEvent::markdown(turn.content.clone()));
            messages.push(Message::assistant(turn.content.clone()));
        }

        if turn.tool_calls.is_empty() {
            response.finish();
            return;
        }

        // Queue this round's calls in model order, generating ids the
        // model omitted, and record the assistant turn in context.
        let queued: Vec<ToolCall> = turn
            .tool_calls
            .into_iter()
            .map(|call| {
                let id = call.id.unwrap_or_else(Identifier::tool_call);
                ToolCall::function(id, call.name, call.arguments)
            })
            .collect();
        messages.push(Message::assistant_tool_calls(queued.clone()));

        for call in queued {
            if request.cancel_token.is_cancel_requested() {
                response.finish();
                return;
            }

            let Some(tool) = tools.iter().find(|t| t.name() == call.function.name) else {
                error!(tool = %call.function.name, "model requested unknown tool");
                response.stream(ResponseEvent::markdown(UNKNOWN_TOOL_MESSAGE));
                response.finish();
                return;
            };

            let args = match bind_tool_args(&tool.parameters_schema(), &call.function.arguments) {
                Ok(args) => args,
                Err(bind_error) => {
                    warn!(tool = %call.function.name, error = %bind_error,
                        "failed to bind tool arguments");
                    response.stream(ResponseEvent::markdown(BAD_ARGUMENTS_MESSAGE));
                    response.finish();
                    return;
                }
            };

            if let Some(pre_invoke) = tool.pre_invoke(request, &args) {
                if let Some(message) = &pre_invoke.message {
                    response.stream(ResponseEvent::markdown_with_detail(
                        format!("&#x2713; {}...", message),
                        pre_invoke.detail.clone(),
                    ));
                }
                if let Some(confirmation_message) = &pre_invoke.confirmation_message {
                    if !confirm_tool_call(response, &call.id, &pre_invoke.confirmation_title, confirmation_message)
                        .await
                    {
                        response.finish();
                        return;
                    }
                }
            }

            let result = match tool.invoke(request, response, tool_context, args).await {
                Ok(result) => result,
                Err(error) => {
                    error!(tool = %call.function.name, error = %error, "tool invocation failed");
                    response.stream(ResponseEvent::markdown(LOOP_FAILURE_MESSAGE));
                    response.finish();
                    return;
                }
            };

            let result_text = match result {
                Value::String(text) => text,
                other => other.to_string(),
            };
            messages.push(Message::tool_result(call.id.clone(), result_text));
        }

        // At least one tool ran this round; go around with the updated
        // context.
    }
}

/// Run the confirmation sub-protocol for one tool call. Returns whether
/// the user approved.
async fn confirm_tool_call(
    response: &dyn ResponseChannel,
    call_id: &str,
    title: &Option<String>,
    message: &str,
) -> bool {
    response.stream(ResponseEvent::Confirmation {
        title: title.clone().unwrap_or_else(|| "Approve".to_string()),
        message: message.to_string(),
        confirm_args: json!({
            "id": response.message_id(),
            "data": {"callback_id": call_id, "data": {"confirmed": true}},
        }),
        cancel_args: json!({
            "id": response.message_id(),
            "data": {"callback_id": call_id, "data": {"confirmed": false}},
        }),
        confirm_label: None,
        cancel_label: None,
    });

    match response.wait_for_user_input(call_id).await {
        Ok(user_input) => user_input.get("confirmed").and_then(Value::as_bool) == Some(true),
        Err(_) => false,
    }
}
