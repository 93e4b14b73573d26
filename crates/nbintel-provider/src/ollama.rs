//! Ollama provider implementation.
//!
//! Chat goes through Ollama's OpenAI-compatible `/v1` endpoint; the
//! available models are discovered dynamically from `/api/tags` and can
//! be refreshed on demand. Inline completion uses `/api/generate` with a
//! fill-in-the-middle prompt template chosen by model family.

use crate::{
    error::ProviderError,
    message::Message,
    model::{ModelInfo, DEFAULT_CONTEXT_WINDOW},
    openai_compatible::{build_chat_body, send_chat_request},
    ChatModel, CompletionOptions, CompletionStream, InlineCompletionModel, LlmProvider,
    ProviderResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const QWEN_FIM_PROMPT: &str = "<|fim_prefix|>{prefix}<|fim_suffix|>{suffix}<|fim_middle|>";
const DEEPSEEK_FIM_PROMPT: &str =
    "<\u{ff5c}fim\u{2581}begin\u{ff5c}>{prefix}<\u{ff5c}fim\u{2581}hole\u{ff5c}>{suffix}<\u{ff5c}fim\u{2581}end\u{ff5c}>";
const CODELLAMA_FIM_PROMPT: &str = "<PRE> {prefix} <SUF>{suffix} <MID>";
const STARCODER_FIM_PROMPT: &str = "<fim_prefix>{prefix}<fim_suffix>{suffix}<fim_middle>";
const CODESTRAL_FIM_PROMPT: &str = "[SUFFIX]{suffix}[PREFIX]{prefix}";

/// Pick a fill-in-the-middle prompt template for a model name.
fn fim_template(model: &str) -> &'static str {
    let model = model.to_lowercase();
    if model.starts_with("qwen") {
        QWEN_FIM_PROMPT
    } else if model.starts_with("deepseek") {
        DEEPSEEK_FIM_PROMPT
    } else if model.starts_with("codellama") {
        CODELLAMA_FIM_PROMPT
    } else if model.starts_with("starcoder") {
        STARCODER_FIM_PROMPT
    } else {
        CODESTRAL_FIM_PROMPT
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Chat model served by a local Ollama instance.
pub struct OllamaChatModel {
    model_id: String,
    base_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn id(&self) -> String {
        self.model_id.clone()
    }

    fn name(&self) -> String {
        self.model_id.clone()
    }

    fn context_window(&self) -> u32 {
        DEFAULT_CONTEXT_WINDOW
    }

    fn provider_id(&self) -> &str {
        "ollama"
    }

    async fn completions(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> ProviderResult<CompletionStream> {
        let body = build_chat_body(&self.model_id, &messages, &options);
        let url = format!("{}/v1/chat/completions", self.base_url);
        send_chat_request(&self.client, url, None, body, options.abort).await
    }
}

/// Inline completion model served by a local Ollama instance.
pub struct OllamaInlineCompletionModel {
    model_id: String,
    base_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl InlineCompletionModel for OllamaInlineCompletionModel {
    fn id(&self) -> String {
        self.model_id.clone()
    }

    fn name(&self) -> String {
        self.model_id.clone()
    }

    fn context_window(&self) -> u32 {
        DEFAULT_CONTEXT_WINDOW
    }

    async fn inline_completions(
        &self,
        prefix: &str,
        suffix: &str,
        _language: &str,
        _filename: &str,
        abort: Option<tokio_util::sync::CancellationToken>,
    ) -> ProviderResult<String> {
        let prompt = fim_template(&self.model_id)
            .replace("{prefix}", prefix)
            .replace("{suffix}", suffix);

        let body = json!({
            "model": self.model_id,
            "prompt": prompt,
            "raw": true,
            "stream": false,
        });

        let send = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send();
        let response = match abort {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(ProviderError::Cancelled),
                response = send => response?,
            },
            None => send.await?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(status.as_u16(), error_text));
        }

        let body: Value = response.json().await?;
        Ok(body["response"].as_str().unwrap_or("").to_string())
    }
}

/// Ollama provider with a dynamic model list.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    models: RwLock<Vec<ModelInfo>>,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            models: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the installed model list from `/api/tags`.
    pub async fn update_model_list(&self) {
        let url = format!("{}/api/tags", self.base_url);
        let tags: TagsResponse = match self.client.get(&url).send().await {
            Ok(response) => match response.json().await {
                Ok(tags) => tags,
                Err(error) => {
                    warn!(error = %error, "failed to parse ollama model list");
                    return;
                }
            },
            Err(error) => {
                warn!(error = %error, "failed to fetch ollama model list");
                return;
            }
        };

        let mut models = self.models.write().await;
        *models = tags
            .models
            .into_iter()
            .map(|m| ModelInfo::new(m.name.clone(), m.name))
            .collect();
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    async fn chat_models(&self) -> Vec<ModelInfo> {
        self.models.read().await.clone()
    }

    async fn inline_completion_models(&self) -> Vec<ModelInfo> {
        self.models.read().await.clone()
    }

    async fn chat_model(&self, model_id: &str) -> Option<Arc<dyn ChatModel>> {
        let models = self.models.read().await;
        models.iter().find(|m| m.id == model_id)?;
        Some(Arc::new(OllamaChatModel {
            model_id: model_id.to_string(),
            base_url: self.base_url.clone(),
            client: self.client.clone(),
        }))
    }

    async fn inline_completion_model(
        &self,
        model_id: &str,
    ) -> Option<Arc<dyn InlineCompletionModel>> {
        let models = self.models.read().await;
        models.iter().find(|m| m.id == model_id)?;
        Some(Arc::new(OllamaInlineCompletionModel {
            model_id: model_id.to_string(),
            base_url: self.base_url.clone(),
            client: self.client.clone(),
        }))
    }

    async fn refresh(&self) {
        self.update_model_list().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fim_template_selection() {
        assert_eq!(fim_template("qwen2.5-coder"), QWEN_FIM_PROMPT);
        assert_eq!(fim_template("deepseek-coder"), DEEPSEEK_FIM_PROMPT);
        assert_eq!(fim_template("codellama:7b"), CODELLAMA_FIM_PROMPT);
        assert_eq!(fim_template("starcoder2"), STARCODER_FIM_PROMPT);
        assert_eq!(fim_template("anything-else"), CODESTRAL_FIM_PROMPT);
    }

    #[tokio::test]
    async fn test_update_model_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3.2"}, {"name": "qwen2.5-coder"}]
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::with_base_url(server.uri());
        assert!(provider.chat_models().await.is_empty());

        provider.update_model_list().await;
        let models = provider.chat_models().await;
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "llama3.2");
    }

    #[tokio::test]
    async fn test_chat_model_requires_known_id() {
        let provider = OllamaProvider::with_base_url("http://localhost:1");
        assert!(provider.chat_model("llama3.2").await.is_none());
    }

    #[tokio::test]
    async fn test_update_model_list_unreachable_is_harmless() {
        let provider = OllamaProvider::with_base_url("http://127.0.0.1:1");
        provider.update_model_list().await;
        assert!(provider.chat_models().await.is_empty());
    }
}
