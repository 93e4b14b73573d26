//! The chat service: registries, model resolution and request dispatch.
//!
//! `ChatService` owns the provider and participant registries, resolves
//! the configured models, and routes each incoming prompt to the
//! participant it addresses. It is the `Host` every request carries for
//! access to models, config and tool sources.

use crate::assistant::{AssistantParticipant, CopilotAssistantParticipant};
use crate::builtin::{built_in_toolsets, ui_commands};
use crate::config::NbiConfig;
use crate::events::ResponseEvent;
use crate::mcp_participant::McpManager;
use crate::participant::{ChatParticipant, ChatRequestOptions};
use crate::prompt::parse_prompt;
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use crate::tool::{BoxedTool, Toolset};
use nbintel_mcp::McpServer;
use nbintel_provider::copilot::{CopilotProvider, CopilotSession};
use nbintel_provider::litellm::LiteLlmCompatibleProvider;
use nbintel_provider::ollama::OllamaProvider;
use nbintel_provider::openai_compatible::OpenAiCompatibleProvider;
use nbintel_provider::{ChatModel, InlineCompletionModel, LlmProvider};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

/// Participant ids that cannot be registered by extensions.
const RESERVED_PARTICIPANT_IDS: &[&str] = &[
    "chat", "copilot", "jupyter", "jupyterlab", "jlab", "notebook", "intelligence", "nb", "nbi",
    "terminal", "vscode", "workspace", "help", "ai", "config", "settings", "ui", "cell", "code",
    "file", "data", "new", "run", "search",
];

/// Provider ids that cannot be registered by extensions.
const RESERVED_LLM_PROVIDER_IDS: &[&str] = &[
    "openai", "anthropic", "chat", "copilot", "jupyter", "jupyterlab", "jlab", "notebook",
    "intelligence", "nb", "nbi", "ai", "config", "settings", "ui", "cell", "code", "file", "data",
    "new",
];

/// Capabilities the core grants to requests and tools.
pub trait Host: Send + Sync {
    /// The resolved chat model, if configured.
    fn chat_model(&self) -> Option<Arc<dyn ChatModel>>;

    /// The resolved inline completion model, if configured.
    fn inline_completion_model(&self) -> Option<Arc<dyn InlineCompletionModel>>;

    /// The configuration store.
    fn config(&self) -> Arc<NbiConfig>;

    /// A built-in toolset by id.
    fn builtin_toolset(&self, id: &str) -> Option<Toolset>;

    /// All built-in toolsets.
    fn builtin_toolsets(&self) -> Vec<Toolset>;

    /// An MCP server by name.
    fn mcp_server(&self, name: &str) -> Option<Arc<McpServer>>;

    /// An extension toolset.
    fn extension_toolset(&self, extension_id: &str, toolset_id: &str) -> Option<Toolset>;

    /// An extension tool.
    fn extension_tool(
        &self,
        extension_id: &str,
        toolset_id: &str,
        tool_name: &str,
    ) -> Option<BoxedTool>;
}

/// An inline-completion context request.
#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    pub prefix: String,
    pub suffix: String,
    pub language: String,
    pub filename: String,
}

/// Supplies additional context snippets for inline completions.
pub trait CompletionContextProvider: Send + Sync {
    /// Provider id, matched against participants' allow lists.
    fn id(&self) -> String;

    /// Context snippets for the request.
    fn completion_context(&self, request: &ContextRequest) -> Vec<String>;
}

/// The chat orchestration service.
pub struct ChatService {
    config: Arc<NbiConfig>,
    copilot_session: Arc<CopilotSession>,
    llm_providers: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
    chat_participants: RwLock<HashMap<String, Arc<dyn ChatParticipant>>>,
    extension_toolsets: RwLock<HashMap<String, Vec<Toolset>>>,
    context_providers: RwLock<HashMap<String, Arc<dyn CompletionContextProvider>>>,
    builtin_toolsets: Vec<Toolset>,
    chat_model: RwLock<Option<Arc<dyn ChatModel>>>,
    inline_completion_model: RwLock<Option<Arc<dyn InlineCompletionModel>>>,
    mcp_manager: RwLock<Arc<McpManager>>,
}

impl ChatService {
    /// Create the service: register the built-in providers and
    /// participants, build MCP servers, and resolve configured models.
    pub async fn new(config: Arc<NbiConfig>) -> Arc<Self> {
        let service = Arc::new(Self {
            config,
            copilot_session: Arc::new(CopilotSession::new()),
            llm_providers: RwLock::new(HashMap::new()),
            chat_participants: RwLock::new(HashMap::new()),
            extension_toolsets: RwLock::new(HashMap::new()),
            context_providers: RwLock::new(HashMap::new()),
            builtin_toolsets: built_in_toolsets(),
            chat_model: RwLock::new(None),
            inline_completion_model: RwLock::new(None),
            mcp_manager: RwLock::new(Arc::new(McpManager::empty())),
        });

        service.register_llm_provider(Arc::new(CopilotProvider::new(
            service.copilot_session.clone(),
        )));
        service.register_llm_provider(Arc::new(OpenAiCompatibleProvider::new()));
        service.register_llm_provider(Arc::new(LiteLlmCompatibleProvider::new()));
        service.register_llm_provider(Arc::new(OllamaProvider::new()));

        service
            .chat_participants
            .write()
            .unwrap()
            .insert("default".to_string(), Arc::new(AssistantParticipant::new()));
        service.register_chat_participant(Arc::new(
            crate::test_participant::TestParticipant::new(),
        ));

        service.update_mcp_servers();
        service.update_models_from_config().await;
        service
    }

    /// The Copilot auth session.
    pub fn copilot_session(&self) -> Arc<CopilotSession> {
        self.copilot_session.clone()
    }

    /// Register an LLM provider. Reserved and duplicate ids are refused.
    pub fn register_llm_provider(&self, provider: Arc<dyn LlmProvider>) {
        let id = provider.id().to_string();
        if RESERVED_LLM_PROVIDER_IDS.contains(&id.as_str()) {
            error!(provider = %id, "LLM provider id is reserved");
            return;
        }
        let mut providers = self.llm_providers.write().unwrap();
        if providers.contains_key(&id) {
            error!(provider = %id, "LLM provider id is already in use");
            return;
        }
        providers.insert(id, provider);
    }

    /// Register a chat participant. Reserved and duplicate ids are
    /// refused.
    pub fn register_chat_participant(&self, participant: Arc<dyn ChatParticipant>) {
        let id = participant.id();
        if RESERVED_PARTICIPANT_IDS.contains(&id.as_str()) {
            error!(participant = %id, "participant id is reserved");
            return;
        }
        let mut participants = self.chat_participants.write().unwrap();
        if participants.contains_key(&id) {
            error!(participant = %id, "participant id is already in use");
            return;
        }
        participants.insert(id, participant);
    }

    /// Register an extension toolset under its extension id.
    pub fn register_toolset(&self, extension_id: &str, toolset: Toolset) {
        self.extension_toolsets
            .write()
            .unwrap()
            .entry(extension_id.to_string())
            .or_default()
            .push(toolset);
    }

    /// Register an inline-completion context provider.
    pub fn register_completion_context_provider(
        &self,
        provider: Arc<dyn CompletionContextProvider>,
    ) {
        let id = provider.id();
        let mut providers = self.context_providers.write().unwrap();
        if providers.contains_key(&id) {
            error!(provider = %id, "context provider id is already in use");
            return;
        }
        providers.insert(id, provider);
    }

    /// Look up a provider by id.
    pub fn llm_provider(&self, id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.llm_providers.read().unwrap().get(id).cloned()
    }

    /// All registered providers.
    pub fn llm_providers(&self) -> Vec<Arc<dyn LlmProvider>> {
        self.llm_providers.read().unwrap().values().cloned().collect()
    }

    /// Look up a participant by id.
    pub fn chat_participant(&self, id: &str) -> Option<Arc<dyn ChatParticipant>> {
        self.chat_participants.read().unwrap().get(id).cloned()
    }

    /// All registered participants.
    pub fn chat_participants(&self) -> Vec<Arc<dyn ChatParticipant>> {
        self.chat_participants
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect()
    }

    /// All MCP servers built from configuration.
    pub fn mcp_servers(&self) -> Vec<Arc<McpServer>> {
        self.mcp_manager.read().unwrap().servers().to_vec()
    }

    /// Re-resolve models from the configuration and install the default
    /// participant matching the chat model's provider.
    pub async fn update_models_from_config(&self) {
        let chat_config = self.config.chat_model();
        let chat_provider_id = chat_config["provider"].as_str().unwrap_or("none").to_string();
        let chat_model = self
            .resolve_chat_model(&chat_provider_id, &chat_config)
            .await;
        *self.chat_model.write().unwrap() = chat_model;

        let inline_config = self.config.inline_completion_model();
        let inline_provider_id = inline_config["provider"].as_str().unwrap_or("none");
        let inline_model = self
            .resolve_inline_model(inline_provider_id, &inline_config)
            .await;
        *self.inline_completion_model.write().unwrap() = inline_model;

        let default: Arc<dyn ChatParticipant> = if chat_provider_id == "github-copilot" {
            Arc::new(CopilotAssistantParticipant::new())
        } else {
            Arc::new(AssistantParticipant::new())
        };
        self.chat_participants
            .write()
            .unwrap()
            .insert("default".to_string(), default);
    }

    async fn resolve_chat_model(
        &self,
        provider_id: &str,
        model_config: &Value,
    ) -> Option<Arc<dyn ChatModel>> {
        let provider = self.llm_provider(provider_id)?;
        let model_id = model_config["model"].as_str()?;
        let model = provider.chat_model(model_id).await?;
        apply_properties(model_config, |id, value| model.set_property(id, value));
        Some(model)
    }

    async fn resolve_inline_model(
        &self,
        provider_id: &str,
        model_config: &Value,
    ) -> Option<Arc<dyn InlineCompletionModel>> {
        let provider = self.llm_provider(provider_id)?;
        let model_id = model_config["model"].as_str()?;
        let model = provider.inline_completion_model(model_id).await?;
        apply_properties(model_config, |id, value| model.set_property(id, value));
        Some(model)
    }

    /// Rebuild MCP servers and participants from configuration.
    pub fn update_mcp_servers(&self) {
        let manager = Arc::new(McpManager::from_config(&self.config.mcp()));

        {
            let mut participants = self.chat_participants.write().unwrap();
            participants.retain(|id, _| id != "mcp" && !id.starts_with("mcp-"));
            for participant in manager.participants() {
                participants.insert(participant.id(), participant.clone());
            }
        }

        if tokio::runtime::Handle::try_current().is_ok() {
            manager.spawn_tool_discovery();
        }

        *self.mcp_manager.write().unwrap() = manager;
        info!("MCP servers updated");
    }

    /// Handle a routed chat request: resolve the participant from the
    /// prompt and dispatch. The "chat model is not set" path answers
    /// directly with a configuration button.
    pub async fn handle_chat_request(
        self: &Arc<Self>,
        mut request: ChatRequest,
        response: Arc<dyn ResponseChannel>,
        options: ChatRequestOptions,
    ) {
        if self.chat_model().is_none() {
            response.stream(ResponseEvent::markdown("Chat model is not set!"));
            response.stream(ResponseEvent::Button {
                title: "Configure".to_string(),
                command_id: ui_commands::OPEN_CONFIGURATION.to_string(),
                args: json!({}),
            });
            response.finish();
            return;
        }

        let parsed = parse_prompt(&request.prompt);
        let participant = self
            .chat_participant(&parsed.participant)
            .or_else(|| self.chat_participant("default"));
        let Some(participant) = participant else {
            response.finish();
            return;
        };

        request.command = parsed.command;
        request.prompt = parsed.input;
        response.set_participant(&parsed.participant);

        participant
            .handle_chat_request(&request, response.as_ref(), options)
            .await;
    }

    /// Collect inline-completion context from the registered providers,
    /// filtered by the allow list. Provider failures are contained.
    pub fn completion_context(&self, request: &ContextRequest, allowed: &[String]) -> Vec<String> {
        let any = allowed.iter().any(|id| id == "*");
        let providers: Vec<_> = self
            .context_providers
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();

        let mut items = Vec::new();
        for provider in providers {
            if !any && !allowed.contains(&provider.id()) {
                continue;
            }
            items.extend(provider.completion_context(request));
        }
        items
    }

    /// A capabilities snapshot for the front end.
    pub async fn capabilities(&self) -> Value {
        let mut chat_models = Vec::new();
        let mut inline_models = Vec::new();
        let mut providers = Vec::new();
        for provider in self.llm_providers() {
            providers.push(json!({"id": provider.id(), "name": provider.name()}));
            for model in provider.chat_models().await {
                chat_models.push(json!({
                    "provider": provider.id(),
                    "id": model.id,
                    "name": model.name,
                    "context_window": model.context_window,
                    "properties": model.properties,
                }));
            }
            for model in provider.inline_completion_models().await {
                inline_models.push(json!({
                    "provider": provider.id(),
                    "id": model.id,
                    "name": model.name,
                    "context_window": model.context_window,
                    "properties": model.properties,
                }));
            }
        }
        providers.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        let mut participants = Vec::new();
        for participant in self.chat_participants() {
            participants.push(json!({
                "id": participant.id(),
                "name": participant.name(),
                "description": participant.description(),
                "iconPath": participant.icon_path(),
                "commands": participant
                    .commands()
                    .iter()
                    .map(|c| c.name.clone())
                    .collect::<Vec<_>>(),
            }));
        }
        participants.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        let builtin_toolsets: Vec<Value> = self
            .builtin_toolsets
            .iter()
            .map(|toolset| json!({"id": toolset.id, "name": toolset.name}))
            .collect();

        let mut mcp_servers = Vec::new();
        for server in self.mcp_servers() {
            let tools: Vec<Value> = server
                .tools()
                .await
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description.clone().unwrap_or_default(),
                    })
                })
                .collect();
            if !tools.is_empty() {
                mcp_servers.push(json!({"id": server.name(), "tools": tools}));
            }
        }
        mcp_servers.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        let mut extensions = Vec::new();
        for (extension_id, toolsets) in self.extension_toolsets.read().unwrap().iter() {
            let mut toolset_list: Vec<Value> = toolsets
                .iter()
                .map(|toolset| {
                    let mut tools: Vec<Value> = toolset
                        .tools
                        .iter()
                        .map(|tool| json!({"name": tool.name(), "description": tool.description()}))
                        .collect();
                    tools.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
                    json!({
                        "id": toolset.id,
                        "name": toolset.name,
                        "description": toolset.description,
                        "tools": tools,
                    })
                })
                .collect();
            toolset_list.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
            extensions.push(json!({"id": extension_id, "toolsets": toolset_list}));
        }
        extensions.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        json!({
            "server_root_dir": self.config.server_root_dir(),
            "user_config_dir": self.config.user_dir().display().to_string(),
            "using_github_copilot_service": self.config.using_github_copilot_service(),
            "llm_providers": providers,
            "chat_models": chat_models,
            "inline_completion_models": inline_models,
            "chat_model": self.config.chat_model(),
            "inline_completion_model": self.config.inline_completion_model(),
            "chat_participants": participants,
            "tool_config": {
                "builtinToolsets": builtin_toolsets,
                "mcpServers": mcp_servers,
                "extensions": extensions,
            },
            "default_chat_mode": self.config.default_chat_mode(),
        })
    }
}

fn apply_properties(model_config: &Value, mut set: impl FnMut(&str, &str)) {
    if let Some(properties) = model_config.get("properties").and_then(Value::as_array) {
        for property in properties {
            if let (Some(id), Some(value)) = (
                property.get("id").and_then(Value::as_str),
                property.get("value").and_then(Value::as_str),
            ) {
                set(id, value);
            }
        }
    }
}

impl Host for ChatService {
    fn chat_model(&self) -> Option<Arc<dyn ChatModel>> {
        self.chat_model.read().unwrap().clone()
    }

    fn inline_completion_model(&self) -> Option<Arc<dyn InlineCompletionModel>> {
        self.inline_completion_model.read().unwrap().clone()
    }

    fn config(&self) -> Arc<NbiConfig> {
        self.config.clone()
    }

    fn builtin_toolset(&self, id: &str) -> Option<Toolset> {
        self.builtin_toolsets.iter().find(|t| t.id == id).cloned()
    }

    fn builtin_toolsets(&self) -> Vec<Toolset> {
        self.builtin_toolsets.clone()
    }

    fn mcp_server(&self, name: &str) -> Option<Arc<McpServer>> {
        self.mcp_manager.read().unwrap().server(name)
    }

    fn extension_toolset(&self, extension_id: &str, toolset_id: &str) -> Option<Toolset> {
        self.extension_toolsets
            .read()
            .unwrap()
            .get(extension_id)?
            .iter()
            .find(|t| t.id == toolset_id)
            .cloned()
    }

    fn extension_tool(
        &self,
        extension_id: &str,
        toolset_id: &str,
        tool_name: &str,
    ) -> Option<BoxedTool> {
        self.extension_toolset(extension_id, toolset_id)?
            .tool(tool_name)
    }
}
