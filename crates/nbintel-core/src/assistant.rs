//! The default assistant participant.
//!
//! Handles recognized slash commands with deterministic UI-command
//! sequences, answers free-form ask-mode prompts with a single streamed
//! completion, and runs the tool loop in agent mode over the tools
//! assembled from built-in toolsets, selected MCP servers and extension
//! tool sets. The Copilot-branded variant only changes the identity in
//! the system prompt.

use crate::builtin::{
    ui_commands, AddCodeCellTool, AddMarkdownCellToNotebookTool, PythonTool,
};
use crate::error::{CoreError, CoreResult};
use crate::events::ResponseEvent;
use crate::participant::{ChatCommand, ChatParticipant, ChatRequestOptions};
use crate::request::{ChatMode, ChatRequest};
use crate::response::ResponseChannel;
use crate::service::Host;
use crate::tool::{BoxedTool, PreInvokeResponse, Tool};
use crate::tool_loop::{run_tool_call_loop, stream_completion, ToolLoopOptions};
use crate::prompts;
use async_trait::async_trait;
use nbintel_mcp::McpServer;
use nbintel_provider::{collect_turn, CompletionOptions, Message};
use nbintel_util::extract_generated_code;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

const AGENT_BASE_PROMPT: &str = "Try to answer the question with a tool first. If the tool you \
     use has default values for parameters and user didn't provide a value for those, make sure \
     to set the default value for the parameter.\n\n";
const CHAT_FAILURE_MESSAGE: &str =
    "Oops! There was a problem handling chat request. Please try again with a different prompt.";

/// Identity used in the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branding {
    Generic,
    Copilot,
}

/// The default assistant.
pub struct AssistantParticipant {
    branding: Branding,
}

impl AssistantParticipant {
    pub fn new() -> Self {
        Self {
            branding: Branding::Generic,
        }
    }

    fn chat_prompt(&self, model_provider: &str, model_name: &str) -> String {
        match self.branding {
            Branding::Generic => prompts::generic_chat_prompt(model_provider, model_name),
            Branding::Copilot => prompts::copilot_chat_prompt(model_provider, model_name),
        }
    }

    /// Generate the code cell content for a new-notebook command.
    async fn generate_code_cell(&self, request: &ChatRequest) -> CoreResult<String> {
        let prompt = format!("Generate code for: {}", request.prompt);
        self.generate(
            request,
            "You are an assistant that creates Python code which will be used in a Jupyter \
             notebook. Generate only Python code and some comments for the code. You should \
             return the code directly, without wrapping it inside ```.",
            &prompt,
        )
        .await
    }

    /// Generate a markdown explanation for generated code.
    async fn generate_markdown_for_code(
        &self,
        request: &ChatRequest,
        code: &str,
    ) -> CoreResult<String> {
        let prompt = format!("Generate markdown that explains this code: {}", code);
        self.generate(
            request,
            "You are an assistant that explains the provided code using markdown. Don't include \
             any code, just narrative markdown text. Keep it concise, only generate few lines. \
             First create a title that suits the code and then explain the code briefly. You \
             should return the markdown directly, without wrapping it inside ```.",
            &prompt,
        )
        .await
    }

    /// Generate the content of a new Python file.
    async fn generate_python_file(&self, request: &ChatRequest) -> CoreResult<String> {
        let prompt = format!("Generate code for: {}", request.prompt);
        self.generate(
            request,
            "You are an assistant that creates Python code. You should return the code \
             directly, without wrapping it inside ```.",
            &prompt,
        )
        .await
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        system_prompt: &str,
        user_prompt: &str,
    ) -> CoreResult<String> {
        let model = request
            .host
            .chat_model()
            .ok_or_else(|| CoreError::config("chat model is not set"))?;

        let mut messages = request.chat_history.clone();
        // The raw routed prompt is replaced by the task-specific one.
        messages.pop();
        messages.insert(0, Message::system(system_prompt));
        messages.push(Message::user(user_prompt));

        let options = CompletionOptions {
            abort: Some(request.cancel_token.handle()),
            ..Default::default()
        };
        let turn = collect_turn(model.completions(messages, options).await?).await?;
        Ok(extract_generated_code(&turn.content))
    }

    async fn handle_new_notebook(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
    ) -> CoreResult<()> {
        let created = response
            .run_ui_command(ui_commands::CREATE_NEW_NOTEBOOK, json!({"code": ""}))
            .await?;
        let file_path = created["path"].as_str().unwrap_or_default().to_string();

        let code = self.generate_code_cell(request).await?;
        let markdown = self.generate_markdown_for_code(request, &code).await?;

        response
            .run_ui_command(
                ui_commands::ADD_MARKDOWN_CELL,
                json!({"markdown": markdown, "path": file_path}),
            )
            .await?;
        response
            .run_ui_command(
                ui_commands::ADD_CODE_CELL,
                json!({"code": code, "path": file_path}),
            )
            .await?;

        response.stream(ResponseEvent::markdown(format!(
            "Notebook '{}' created and opened successfully",
            file_path
        )));
        Ok(())
    }

    async fn handle_new_python_file(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
    ) -> CoreResult<()> {
        let code = self.generate_python_file(request).await?;
        let created = response
            .run_ui_command(ui_commands::CREATE_NEW_FILE, json!({"code": code}))
            .await?;
        let file_path = created["path"].as_str().unwrap_or_default();

        response.stream(ResponseEvent::markdown(format!(
            "File '{}' created successfully",
            file_path
        )));
        Ok(())
    }

    async fn handle_ask_mode(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    ) {
        match request.command.as_str() {
            "newNotebook" => {
                if let Err(err) = self.handle_new_notebook(request, response).await {
                    error!(error = %err, "new notebook command failed");
                    response.stream(ResponseEvent::markdown(CHAT_FAILURE_MESSAGE));
                }
                response.finish();
            }
            "newPythonFile" => {
                if let Err(err) = self.handle_new_python_file(request, response).await {
                    error!(error = %err, "new python file command failed");
                    response.stream(ResponseEvent::markdown(CHAT_FAILURE_MESSAGE));
                }
                response.finish();
            }
            "settings" => {
                if let Err(err) = response
                    .run_ui_command(ui_commands::OPEN_CONFIGURATION, json!({}))
                    .await
                {
                    warn!(error = %err, "failed to open configuration dialog");
                }
                response.stream(ResponseEvent::markdown("Opened the settings dialog"));
                response.finish();
            }
            // Unrecognized commands fall through to normal chat with the
            // command token simply absent from the prompt.
            _ => {
                let system_prompt = options.system_prompt.clone().unwrap_or_else(|| {
                    match request.host.chat_model() {
                        Some(model) => {
                            self.chat_prompt(model.provider_id(), &model.name())
                        }
                        None => String::new(),
                    }
                });

                let is_copilot = request
                    .host
                    .chat_model()
                    .map(|m| m.provider_id() == "github-copilot")
                    .unwrap_or(false);
                if !is_copilot {
                    response.stream(ResponseEvent::progress("Thinking..."));
                }

                stream_completion(request, response, Some(system_prompt)).await;
            }
        }
    }

    async fn handle_agent_mode(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    ) {
        let tools = self.tools(request).await;

        let mut system_prompt = match &options.system_prompt {
            Some(prompt) => format!("{}\n", prompt),
            None => String::new(),
        };
        if !tools.is_empty() {
            system_prompt.push_str(AGENT_BASE_PROMPT);
        }
        for toolset_id in &request.tool_selection.built_in_toolsets {
            if let Some(toolset) = request.host.builtin_toolset(toolset_id) {
                if let Some(instructions) = &toolset.instructions {
                    system_prompt.push_str(instructions);
                    system_prompt.push('\n');
                }
            }
        }
        for (extension_id, toolsets) in &request.tool_selection.extension_tools {
            for toolset_id in toolsets.keys() {
                if let Some(toolset) = request.host.extension_toolset(extension_id, toolset_id) {
                    if let Some(instructions) = &toolset.instructions {
                        system_prompt.push_str(instructions);
                        system_prompt.push('\n');
                    }
                }
            }
        }

        // Connect/disconnect bracket the request for each selected server.
        let mut servers: Vec<Arc<McpServer>> = Vec::new();
        for server_name in request.tool_selection.mcp_server_tools.keys() {
            if let Some(server) = request.host.mcp_server(server_name) {
                if !servers.iter().any(|s| s.name() == server.name()) {
                    servers.push(server);
                }
            }
        }
        for server in &servers {
            if let Err(err) = server.connect().await {
                warn!(server = %server.name(), error = %err, "failed to connect MCP server");
            }
        }

        run_tool_call_loop(
            &tools,
            request,
            response,
            ToolLoopOptions {
                system_prompt: Some(system_prompt),
                ..Default::default()
            },
            &json!({}),
        )
        .await;

        for server in &servers {
            if let Err(err) = server.disconnect().await {
                warn!(server = %server.name(), error = %err, "failed to disconnect MCP server");
            }
        }
    }
}

impl Default for AssistantParticipant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatParticipant for AssistantParticipant {
    fn id(&self) -> String {
        "default".to_string()
    }

    fn name(&self) -> String {
        match self.branding {
            Branding::Generic => "AI Assistant".to_string(),
            Branding::Copilot => "GitHub Copilot".to_string(),
        }
    }

    fn commands(&self) -> Vec<ChatCommand> {
        vec![
            ChatCommand::new("newNotebook", "Create a new notebook"),
            ChatCommand::new("newPythonFile", "Create a new Python file"),
            ChatCommand::new("clear", "Clears chat history"),
        ]
    }

    async fn tools(&self, request: &ChatRequest) -> Vec<BoxedTool> {
        match request.chat_mode {
            ChatMode::Ask => vec![
                Arc::new(AddMarkdownCellToNotebookTool::new(false)),
                Arc::new(AddCodeCellTool::new(false)),
                Arc::new(PythonTool::new(false)),
            ],
            ChatMode::Agent => {
                let mut tools: Vec<BoxedTool> = Vec::new();

                for toolset_id in &request.tool_selection.built_in_toolsets {
                    if let Some(toolset) = request.host.builtin_toolset(toolset_id) {
                        tools.extend(toolset.tools);
                    }
                }

                for (server_name, tool_names) in &request.tool_selection.mcp_server_tools {
                    let Some(server) = request.host.mcp_server(server_name) else {
                        continue;
                    };
                    for tool_name in tool_names {
                        if let Some(tool) = server.tool(tool_name).await {
                            let auto_approve = server.is_auto_approved(tool_name);
                            tools.push(Arc::new(crate::mcp_participant::McpRemoteTool::new(
                                server.clone(),
                                tool,
                                auto_approve,
                            )));
                        }
                    }
                }

                for (extension_id, toolsets) in &request.tool_selection.extension_tools {
                    for (toolset_id, tool_names) in toolsets {
                        for tool_name in tool_names {
                            if let Some(tool) =
                                request
                                    .host
                                    .extension_tool(extension_id, toolset_id, tool_name)
                            {
                                tools.push(Arc::new(SecuredExtensionTool::new(tool)));
                            }
                        }
                    }
                }

                tools
            }
        }
    }

    async fn handle_chat_request(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    ) {
        match request.chat_mode {
            ChatMode::Ask => self.handle_ask_mode(request, response, options).await,
            ChatMode::Agent => self.handle_agent_mode(request, response, options).await,
        }
    }
}

/// The Copilot-branded assistant. Same behavior as the default
/// assistant, different identity in name and system prompt.
pub struct CopilotAssistantParticipant {
    inner: AssistantParticipant,
}

impl CopilotAssistantParticipant {
    pub fn new() -> Self {
        Self {
            inner: AssistantParticipant {
                branding: Branding::Copilot,
            },
        }
    }
}

impl Default for CopilotAssistantParticipant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatParticipant for CopilotAssistantParticipant {
    fn id(&self) -> String {
        self.inner.id()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn commands(&self) -> Vec<ChatCommand> {
        self.inner.commands()
    }

    async fn tools(&self, request: &ChatRequest) -> Vec<BoxedTool> {
        self.inner.tools(request).await
    }

    async fn handle_chat_request(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        options: ChatRequestOptions,
    ) {
        self.inner
            .handle_chat_request(request, response, options)
            .await;
    }
}

/// Wraps an extension tool so that every invocation requires the user's
/// confirmation, whatever the wrapped tool declares.
pub struct SecuredExtensionTool {
    inner: BoxedTool,
}

impl SecuredExtensionTool {
    pub fn new(inner: BoxedTool) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Tool for SecuredExtensionTool {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn title(&self) -> String {
        self.inner.title()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    fn pre_invoke(&self, _request: &ChatRequest, args: &Value) -> Option<PreInvokeResponse> {
        Some(
            PreInvokeResponse::with_confirmation(
                format!("Calling extension tool '{}'", self.name()),
                "Approve",
                "Are you sure you want to call this extension tool?",
            )
            .with_detail(json!({
                "title": "Parameters",
                "content": args.to_string(),
            })),
        )
    }

    async fn invoke(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value> {
        self.inner
            .invoke(request, response, tool_context, args)
            .await
    }
}

/// Build a generate-code request: context recorded as history, ask-mode
/// completion with a code-generation system prompt.
pub fn generate_code_system_prompt(language: &str, has_existing_code: bool) -> String {
    let existing_code_message = if has_existing_code {
        " Update the existing code section and return a modified version. Don't just return the \
         update, recreate the existing code section with the update."
    } else {
        ""
    };
    format!(
        "You are an assistant that generates code for '{}' language. You generate code between \
         existing leading and trailing code sections.{} Be concise and return only code as a \
         response. Don't include leading content or trailing content in your response, they are \
         provided only for context. You can reuse methods and symbols defined in leading and \
         trailing content.",
        language, existing_code_message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingChannel, TestHost};
    use nbintel_provider::scripted::{ScriptedChatModel, ScriptedTurn};
    use nbintel_provider::ToolChoice;

    #[tokio::test]
    async fn test_commands() {
        let participant = AssistantParticipant::new();
        let names: Vec<String> = participant.commands().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["newNotebook", "newPythonFile", "clear"]);
    }

    #[tokio::test]
    async fn test_ask_mode_tools() {
        let participant = AssistantParticipant::new();
        let host = TestHost::without_model();
        let request = host.request("hello");

        let tools = participant.tools(&request).await;
        let names: Vec<String> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "add_markdown_cell_to_notebook",
                "add_code_cell_to_notebook",
                "python"
            ]
        );
    }

    #[tokio::test]
    async fn test_agent_mode_tools_from_builtin_selection() {
        let participant = AssistantParticipant::new();
        let host = TestHost::without_model();
        let mut request = host.request("edit the notebook").with_chat_mode(ChatMode::Agent);
        request
            .tool_selection
            .built_in_toolsets
            .push(crate::builtin::NOTEBOOK_EDIT_TOOLSET.to_string());

        let tools = participant.tools(&request).await;
        assert!(tools.iter().any(|t| t.name() == "create_new_notebook"));
        assert!(tools.iter().any(|t| t.name() == "save_notebook"));
    }

    #[tokio::test]
    async fn test_new_notebook_command_sequence() {
        let model = Arc::new(ScriptedChatModel::new(vec![
            ScriptedTurn::Text("```python\nimport numpy\n```".to_string()),
            ScriptedTurn::Text("# Numpy notebook".to_string()),
        ]));
        let host = TestHost::with_model(model);
        let mut request = host.request("plot a sine wave");
        request.command = "newNotebook".to_string();
        let channel = RecordingChannel::new("msg-1");
        channel.set_ui_command_result(json!({"path": "sine.ipynb"}));

        let participant = AssistantParticipant::new();
        participant
            .handle_chat_request(&request, &channel, ChatRequestOptions::default())
            .await;

        let commands = channel.ui_command_log();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].0, ui_commands::CREATE_NEW_NOTEBOOK);
        assert_eq!(commands[1].0, ui_commands::ADD_MARKDOWN_CELL);
        assert_eq!(commands[1].1["markdown"], "# Numpy notebook");
        assert_eq!(commands[2].0, ui_commands::ADD_CODE_CELL);
        // Code fences were stripped before insertion.
        assert_eq!(commands[2].1["code"], "import numpy");

        assert_eq!(channel.finish_count(), 1);
        assert!(channel
            .markdown_contents()
            .iter()
            .any(|c| c.contains("sine.ipynb")));
    }

    #[tokio::test]
    async fn test_settings_command() {
        let host = TestHost::with_model(Arc::new(ScriptedChatModel::new(vec![])));
        let mut request = host.request("");
        request.command = "settings".to_string();
        let channel = RecordingChannel::new("msg-1");

        let participant = AssistantParticipant::new();
        participant
            .handle_chat_request(&request, &channel, ChatRequestOptions::default())
            .await;

        let commands = channel.ui_command_log();
        assert_eq!(commands[0].0, ui_commands::OPEN_CONFIGURATION);
        assert_eq!(channel.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_plain_ask_streams_with_progress() {
        let model = Arc::new(ScriptedChatModel::new(vec![ScriptedTurn::Text(
            "Here is your answer".to_string(),
        )]));
        let host = TestHost::with_model(model.clone());
        let request = host.request("what is numpy?");
        let channel = RecordingChannel::new("msg-1");

        let participant = AssistantParticipant::new();
        participant
            .handle_chat_request(&request, &channel, ChatRequestOptions::default())
            .await;

        // The scripted provider is not copilot, so a progress note leads.
        assert_eq!(channel.progress_count(), 1);
        assert_eq!(channel.markdown_part_contents().join(""), "Here is your answer");
        assert_eq!(channel.finish_count(), 1);

        // The system prompt carried the assistant identity.
        let call = &model.calls()[0];
        assert!(call
            .system_prompt
            .as_ref()
            .unwrap()
            .contains("Notebook Intelligence"));
    }

    #[tokio::test]
    async fn test_agent_mode_prompt_carries_instructions() {
        let model = Arc::new(ScriptedChatModel::new(vec![ScriptedTurn::Text(
            "done".to_string(),
        )]));
        let host = TestHost::with_model(model.clone());
        let mut request = host.request("add a cell").with_chat_mode(ChatMode::Agent);
        request
            .tool_selection
            .built_in_toolsets
            .push(crate::builtin::NOTEBOOK_EDIT_TOOLSET.to_string());
        let channel = RecordingChannel::new("msg-1");

        let participant = AssistantParticipant::new();
        participant
            .handle_chat_request(&request, &channel, ChatRequestOptions::default())
            .await;

        let call = &model.calls()[0];
        // System prompt goes in as the leading system message.
        let system_text = call
            .messages
            .first()
            .filter(|m| m.role == nbintel_provider::Role::System)
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        assert!(system_text.contains("Try to answer the question with a tool first"));
        assert!(system_text.contains("create_new_notebook"));
        assert_eq!(call.tool_choice, ToolChoice::Auto);
        assert!(call.tool_names.contains(&"save_notebook".to_string()));
        assert_eq!(channel.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_copilot_variant_identity() {
        let participant = CopilotAssistantParticipant::new();
        assert_eq!(participant.id(), "default");
        assert_eq!(participant.name(), "GitHub Copilot");
    }

    #[tokio::test]
    async fn test_secured_extension_tool_requires_confirmation() {
        struct PlainTool;
        #[async_trait]
        impl Tool for PlainTool {
            fn name(&self) -> String {
                "plain".to_string()
            }
            fn description(&self) -> String {
                "A plain tool".to_string()
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object", "properties": {}})
            }
            async fn invoke(
                &self,
                _request: &ChatRequest,
                _response: &dyn ResponseChannel,
                _tool_context: &Value,
                _args: Value,
            ) -> CoreResult<Value> {
                Ok(json!("ok"))
            }
        }

        let secured = SecuredExtensionTool::new(Arc::new(PlainTool));
        let host = TestHost::without_model();
        let request = host.request("x");
        let pre = secured.pre_invoke(&request, &json!({"a": 1})).unwrap();
        assert!(pre.confirmation_message.is_some());
        assert!(pre.detail.unwrap()["content"].as_str().unwrap().contains("\"a\""));
    }

    #[test]
    fn test_generate_code_system_prompt() {
        let prompt = generate_code_system_prompt("python", false);
        assert!(prompt.contains("'python'"));
        assert!(!prompt.contains("existing code section with the update"));

        let prompt = generate_code_system_prompt("python", true);
        assert!(prompt.contains("recreate the existing code section"));
    }
}
