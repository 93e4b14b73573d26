//! GitHub Copilot provider implementation.
//!
//! Authentication uses GitHub's device flow: request a device code, let
//! the user activate it, poll for the OAuth access token, then exchange
//! it for a short-lived Copilot API token before each completion batch.
//! All auth state lives in an explicit [`CopilotSession`] owned by the
//! provider and shared by its models.

use crate::{
    error::ProviderError,
    message::Message,
    model::ModelInfo,
    openai_compatible::{build_chat_body, send_chat_request},
    ChatModel, CompletionOptions, CompletionStream, InlineCompletionModel, LlmProvider,
    ProviderResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const GITHUB_URL: &str = "https://github.com";
const GITHUB_API_URL: &str = "https://api.github.com";
const COPILOT_API_URL: &str = "https://api.githubcopilot.com";
const PROXY_ENDPOINT: &str = "https://copilot-proxy.githubusercontent.com";

const CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
const EDITOR_VERSION: &str = "nbintel/0.1.0";
const EDITOR_PLUGIN_VERSION: &str = "nbintel/0.1.0";

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(EDITOR_PLUGIN_VERSION));
    headers.insert("editor-version", HeaderValue::from_static(EDITOR_VERSION));
    headers.insert(
        "editor-plugin-version",
        HeaderValue::from_static(EDITOR_PLUGIN_VERSION),
    );
    headers.insert("Copilot-Integration-Id", HeaderValue::from_static("nbintel"));
    headers
}

/// Login status snapshot reported to the front end.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LoginStatus {
    NotLoggedIn,
    ActivationPending {
        verification_uri: String,
        user_code: String,
    },
    LoggedIn,
}

/// Device verification info shown to the user during login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceVerification {
    pub verification_uri: String,
    pub user_code: String,
    pub device_code: String,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct ExchangedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct AuthState {
    /// GitHub OAuth access token from the device flow.
    access_token: Option<String>,
    /// Exchanged Copilot API token.
    copilot_token: Option<ExchangedToken>,
    /// Pending device verification, while activation is in progress.
    pending: Option<DeviceVerification>,
}

/// Explicit Copilot auth/session state, owned by the hosting process.
pub struct CopilotSession {
    client: reqwest::Client,
    state: RwLock<AuthState>,
}

impl CopilotSession {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .default_headers(default_headers())
                .build()
                .unwrap_or_default(),
            state: RwLock::new(AuthState::default()),
        }
    }

    /// Current login status.
    pub async fn login_status(&self) -> LoginStatus {
        let state = self.state.read().await;
        if state.access_token.is_some() {
            LoginStatus::LoggedIn
        } else if let Some(pending) = &state.pending {
            LoginStatus::ActivationPending {
                verification_uri: pending.verification_uri.clone(),
                user_code: pending.user_code.clone(),
            }
        } else {
            LoginStatus::NotLoggedIn
        }
    }

    /// Log in with a previously stored access token.
    pub async fn login_with_access_token(&self, access_token: impl Into<String>) {
        let mut state = self.state.write().await;
        state.access_token = Some(access_token.into());
        state.pending = None;
    }

    /// Start the device flow. Returns the verification info to show the
    /// user; call [`CopilotSession::poll_access_token`] until it reports
    /// the login completed.
    pub async fn login(&self) -> ProviderResult<DeviceVerification> {
        let response = self
            .client
            .post(format!("{}/login/device/code", GITHUB_URL))
            .json(&json!({"client_id": CLIENT_ID, "scope": "read:user"}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::api(status.as_u16(), "device code request failed"));
        }

        let verification: DeviceVerification = response.json().await?;
        let mut state = self.state.write().await;
        state.pending = Some(verification.clone());
        Ok(verification)
    }

    /// Poll for the access token once. Returns true when the user has
    /// completed activation and the token was stored.
    pub async fn poll_access_token(&self) -> ProviderResult<bool> {
        let device_code = {
            let state = self.state.read().await;
            match &state.pending {
                Some(pending) => pending.device_code.clone(),
                None => return Ok(false),
            }
        };

        let response = self
            .client
            .post(format!("{}/login/oauth/access_token", GITHUB_URL))
            .json(&json!({
                "client_id": CLIENT_ID,
                "device_code": device_code,
                "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
            }))
            .send()
            .await?;

        let body: Value = response.json().await?;
        match body.get("access_token").and_then(Value::as_str) {
            Some(token) => {
                let mut state = self.state.write().await;
                state.access_token = Some(token.to_string());
                state.pending = None;
                debug!("github device flow completed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll until activation completes or the device code expires.
    pub async fn wait_for_access_token(&self) -> ProviderResult<()> {
        let (interval, expires_in) = {
            let state = self.state.read().await;
            match &state.pending {
                Some(pending) => (
                    pending.interval.unwrap_or(5),
                    pending.expires_in.unwrap_or(900),
                ),
                None => return Ok(()),
            }
        };

        let deadline = Utc::now() + Duration::seconds(expires_in as i64);
        while Utc::now() < deadline {
            if self.poll_access_token().await? {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
        }
        Err(ProviderError::Auth("device code expired".to_string()))
    }

    /// Log out, dropping all tokens.
    pub async fn logout(&self) -> LoginStatus {
        let mut state = self.state.write().await;
        *state = AuthState::default();
        LoginStatus::NotLoggedIn
    }

    /// Get a valid Copilot API token, exchanging the GitHub access token
    /// when the cached one is missing or about to expire.
    pub async fn copilot_token(&self) -> ProviderResult<String> {
        {
            let state = self.state.read().await;
            if let Some(exchanged) = &state.copilot_token {
                if exchanged.expires_at - Utc::now() > Duration::seconds(10) {
                    return Ok(exchanged.token.clone());
                }
            }
        }

        let access_token = {
            let state = self.state.read().await;
            state
                .access_token
                .clone()
                .ok_or_else(|| ProviderError::Auth("not logged in to GitHub Copilot".to_string()))?
        };

        let response = self
            .client
            .get(format!("{}/copilot_internal/v2/token", GITHUB_API_URL))
            .header("authorization", format!("token {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "copilot token exchange failed");
            return Err(ProviderError::api(status.as_u16(), "token exchange failed"));
        }

        let body: Value = response.json().await?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::protocol("missing token in exchange response"))?
            .to_string();
        let expires_at = body
            .get("expires_at")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::minutes(25));

        let mut state = self.state.write().await;
        state.copilot_token = Some(ExchangedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

impl Default for CopilotSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat model served by the Copilot API.
pub struct CopilotChatModel {
    model: ModelInfo,
    session: Arc<CopilotSession>,
    client: reqwest::Client,
}

#[async_trait]
impl ChatModel for CopilotChatModel {
    fn id(&self) -> String {
        self.model.id.clone()
    }

    fn name(&self) -> String {
        self.model.name.clone()
    }

    fn context_window(&self) -> u32 {
        self.model.context_window
    }

    fn provider_id(&self) -> &str {
        "github-copilot"
    }

    async fn completions(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> ProviderResult<CompletionStream> {
        let token = self.session.copilot_token().await?;
        let body = build_chat_body(&self.model.id, &messages, &options);
        let url = format!("{}/chat/completions", COPILOT_API_URL);
        send_chat_request(&self.client, url, Some(token), body, options.abort).await
    }
}

/// Inline completion model served by the Copilot proxy.
pub struct CopilotInlineCompletionModel {
    model: ModelInfo,
    session: Arc<CopilotSession>,
    client: reqwest::Client,
}

#[async_trait]
impl InlineCompletionModel for CopilotInlineCompletionModel {
    fn id(&self) -> String {
        self.model.id.clone()
    }

    fn name(&self) -> String {
        self.model.name.clone()
    }

    fn context_window(&self) -> u32 {
        self.model.context_window
    }

    async fn inline_completions(
        &self,
        prefix: &str,
        suffix: &str,
        language: &str,
        _filename: &str,
        abort: Option<tokio_util::sync::CancellationToken>,
    ) -> ProviderResult<String> {
        let token = self.session.copilot_token().await?;

        let body = json!({
            "prompt": prefix,
            "suffix": suffix,
            "max_tokens": 1000,
            "temperature": 0,
            "top_p": 1,
            "n": 1,
            "stop": ["\n\n"],
            "stream": true,
            "extra": {"language": language},
        });

        let send = self
            .client
            .post(format!(
                "{}/v1/engines/copilot-codex/completions",
                PROXY_ENDPOINT
            ))
            .bearer_auth(token)
            .json(&body)
            .send();
        let response = match &abort {
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

        // The proxy replies with SSE lines carrying text fragments.
        let body = response.text().await?;
        let mut completion = String::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line == "data: [DONE]" {
                continue;
            }
            let data = line.strip_prefix("data: ").unwrap_or(line);
            if let Ok(chunk) = serde_json::from_str::<Value>(data) {
                if let Some(text) = chunk["choices"][0]["text"].as_str() {
                    completion.push_str(text);
                }
            }
        }
        Ok(completion)
    }
}

/// GitHub Copilot provider.
pub struct CopilotProvider {
    session: Arc<CopilotSession>,
    client: reqwest::Client,
    chat_models: Vec<ModelInfo>,
    inline_models: Vec<ModelInfo>,
}

impl CopilotProvider {
    pub fn new(session: Arc<CopilotSession>) -> Self {
        Self {
            session,
            client: reqwest::Client::builder()
                .default_headers(default_headers())
                .build()
                .unwrap_or_default(),
            chat_models: vec![
                ModelInfo::new("gpt-4o", "GPT-4o").with_context_window(128000),
                ModelInfo::new("gpt-4.1", "GPT-4.1").with_context_window(128000),
                ModelInfo::new("o3-mini", "o3-mini").with_context_window(200000),
            ],
            inline_models: vec![
                ModelInfo::new("gpt-4o-copilot", "GPT-4o Copilot").with_context_window(128000)
            ],
        }
    }

    /// The session holding auth state.
    pub fn session(&self) -> Arc<CopilotSession> {
        self.session.clone()
    }
}

#[async_trait]
impl LlmProvider for CopilotProvider {
    fn id(&self) -> &str {
        "github-copilot"
    }

    fn name(&self) -> &str {
        "GitHub Copilot"
    }

    async fn chat_models(&self) -> Vec<ModelInfo> {
        self.chat_models.clone()
    }

    async fn inline_completion_models(&self) -> Vec<ModelInfo> {
        self.inline_models.clone()
    }

    async fn chat_model(&self, model_id: &str) -> Option<Arc<dyn ChatModel>> {
        let model = self.chat_models.iter().find(|m| m.id == model_id)?;
        Some(Arc::new(CopilotChatModel {
            model: model.clone(),
            session: self.session.clone(),
            client: self.client.clone(),
        }))
    }

    async fn inline_completion_model(
        &self,
        model_id: &str,
    ) -> Option<Arc<dyn InlineCompletionModel>> {
        let model = self.inline_models.iter().find(|m| m.id == model_id)?;
        Some(Arc::new(CopilotInlineCompletionModel {
            model: model.clone(),
            session: self.session.clone(),
            client: self.client.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_status_transitions() {
        let session = CopilotSession::new();
        assert_eq!(session.login_status().await, LoginStatus::NotLoggedIn);

        session.login_with_access_token("gho_test").await;
        assert_eq!(session.login_status().await, LoginStatus::LoggedIn);

        assert_eq!(session.logout().await, LoginStatus::NotLoggedIn);
        assert_eq!(session.login_status().await, LoginStatus::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_poll_without_pending_device_code() {
        let session = CopilotSession::new();
        assert!(!session.poll_access_token().await.unwrap());
    }

    #[tokio::test]
    async fn test_copilot_token_requires_login() {
        let session = CopilotSession::new();
        let result = session.copilot_token().await;
        assert!(matches!(result, Err(ProviderError::Auth(_))));
    }

    #[tokio::test]
    async fn test_provider_model_resolution() {
        let provider = CopilotProvider::new(Arc::new(CopilotSession::new()));
        assert!(provider.chat_model("gpt-4o").await.is_some());
        assert!(provider.chat_model("nonexistent").await.is_none());
        assert!(provider
            .inline_completion_model("gpt-4o-copilot")
            .await
            .is_some());
    }

    #[test]
    fn test_login_status_serialization() {
        let status = LoginStatus::ActivationPending {
            verification_uri: "https://github.com/login/device".to_string(),
            user_code: "ABCD-1234".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "activation-pending");
        assert_eq!(json["user_code"], "ABCD-1234");
    }
}
