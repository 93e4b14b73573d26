//! Test participant for exercising the response channel.
//!
//! `/repeat` echoes the prompt, `/test` emits a scripted sequence of
//! every renderable event type, and anything else runs the tool loop
//! over two temperature-conversion tools (one guarded by confirmation).

use crate::error::CoreResult;
use crate::events::ResponseEvent;
use crate::participant::{ChatCommand, ChatParticipant, ChatRequestOptions};
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::tool::{BoxedTool, PreInvokeResponse, Tool};
use crate::tool_loop::{run_tool_call_loop, ToolLoopOptions};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Converts Fahrenheit to Celsius; guarded by confirmation.
pub struct FahrenheitToCelsiusTool;

#[async_trait]
impl Tool for FahrenheitToCelsiusTool {
    fn name(&self) -> String {
        "convert_fahrenheit_to_celsius".to_string()
    }

    fn title(&self) -> String {
        "Convert Fahrenheit to Celsius Tool".to_string()
    }

    fn description(&self) -> String {
        "This is a tool that converts fahrenheit to celsius".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "temperature": {"type": "number", "description": "Temperature in fahrenheit"}
            },
            "required": ["temperature"],
            "additionalProperties": false,
        })
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(PreInvokeResponse::with_confirmation(
            "Converting fahrenheit to celsius",
            "Confirm conversion",
            "Are you sure you want to convert the temperature?",
        ))
    }

    async fn invoke(
        &self,
        _request: &ChatRequest,
        _response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let temperature = args["temperature"].as_f64().unwrap_or(0.0);
        Ok(json!({"celsius": (temperature - 32.0) * 5.0 / 9.0}))
    }
}

/// Converts Celsius to Kelvin; auto-approved.
pub struct CelsiusToKelvinTool;

#[async_trait]
impl Tool for CelsiusToKelvinTool {
    fn name(&self) -> String {
        "convert_celsius_to_kelvin".to_string()
    }

    fn title(&self) -> String {
        "Convert Celsius to Kelvin Tool".to_string()
    }

    fn description(&self) -> String {
        "This is a tool that converts celsius to kelvin".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "temperature": {"type": "number", "description": "Temperature in celsius"}
            },
            "required": ["temperature"],
            "additionalProperties": false,
        })
    }

    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        Some(PreInvokeResponse::message("Converting celsius to kelvin"))
    }

    async fn invoke(
        &self,
        _request: &ChatRequest,
        _response: &dyn ResponseChannel,
        _tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        let temperature = args["temperature"].as_f64().unwrap_or(0.0);
        Ok(json!({"kelvin": temperature + 273.15}))
    }
}

/// Scripted participant used to exercise the channel end to end.
pub struct TestParticipant;

impl TestParticipant {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TestParticipant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatParticipant for TestParticipant {
    fn id(&self) -> String {
        "test".to_string()
    }

    fn name(&self) -> String {
        "Test Participant".to_string()
    }

    fn commands(&self) -> Vec<ChatCommand> {
        vec![
            ChatCommand::new("repeat", "Repeats the prompt"),
            ChatCommand::new("test", "Test command"),
        ]
    }

    async fn tools(&self, _request: &ChatRequest) -> Vec<BoxedTool> {
        vec![
            Arc::new(FahrenheitToCelsiusTool),
            Arc::new(CelsiusToKelvinTool),
        ]
    }

    async fn handle_chat_request(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    ) {
        match request.command.as_str() {
            "repeat" => {
                response.stream(ResponseEvent::markdown(format!(
                    "repeating: {}",
                    request.prompt
                )));
                response.finish();
            }
            "test" => {
                for i in 0..5 {
                    response.stream(ResponseEvent::markdown(format!("Hello world {}!\n\n", i + 1)));
                }
                response.stream(ResponseEvent::progress("Running..."));
                response.stream(ResponseEvent::HtmlFrame {
                    source: "<b>Bold text</b>".to_string(),
                    height: 30,
                });
                response.stream(ResponseEvent::Anchor {
                    uri: "https://www.jupyter.org".to_string(),
                    title: "Click me!".to_string(),
                });
                response.stream(ResponseEvent::Button {
                    title: "Button title".to_string(),
                    command_id: "apputils:notify".to_string(),
                    args: json!({
                        "message": "Chat button was clicked",
                        "type": "success",
                        "options": {"autoClose": false},
                    }),
                });
                response.finish();
            }
            _ => {
                let tools = self.tools(request).await;
                run_tool_call_loop(
                    &tools,
                    request,
                    response,
                    ToolLoopOptions {
                        system_prompt: options.system_prompt.clone(),
                        ..Default::default()
                    },
                    &json!({}),
                )
                .await;
            }
        }
    }
}
