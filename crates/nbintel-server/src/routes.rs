//! HTTP routes: capabilities snapshot, configuration, MCP management
//! and GitHub Copilot login.

use crate::state::AppState;
use crate::ws::ws_handler;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use nbintel_core::Host;
use nbintel_provider::LlmProvider;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Configuration keys the front end may update.
const VALID_CONFIG_KEYS: &[&str] = &["default_chat_mode", "chat_model", "inline_completion_model"];

/// Build the server router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/capabilities", get(get_capabilities))
        .route("/api/config", post(post_config))
        .route("/api/update-provider-models", post(update_provider_models))
        .route("/api/reload-mcp-servers", post(reload_mcp_servers))
        .route("/api/mcp-config-file", get(get_mcp_config).post(post_mcp_config))
        .route("/api/gh-login-status", get(gh_login_status))
        .route("/api/gh-login", post(gh_login))
        .route("/api/gh-logout", get(gh_logout))
        .route("/api/chat", any(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_capabilities(State(state): State<AppState>) -> Json<Value> {
    state.service.update_models_from_config().await;
    Json(state.service.capabilities().await)
}

async fn post_config(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    if let Some(settings) = body.as_object() {
        for (key, value) in settings {
            if VALID_CONFIG_KEYS.contains(&key.as_str()) {
                if let Err(err) = state.service.config().set(key, value.clone()) {
                    error!(key = %key, error = %err, "failed to persist config");
                }
            }
        }
    }
    state.service.update_models_from_config().await;
    Json(json!({}))
}

async fn update_provider_models(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if let Some(provider_id) = body.get("provider").and_then(Value::as_str) {
        if let Some(provider) = state.service.llm_provider(provider_id) {
            provider.refresh().await;
        }
    }
    Json(json!({}))
}

async fn reload_mcp_servers(State(state): State<AppState>) -> Json<Value> {
    state.service.config().load();
    state.service.update_mcp_servers();

    let servers: Vec<Value> = state
        .service
        .mcp_servers()
        .iter()
        .map(|server| json!({"id": server.name()}))
        .collect();
    Json(json!({"mcpServers": servers}))
}

async fn get_mcp_config(State(state): State<AppState>) -> Json<Value> {
    let mut mcp = state.service.config().mcp();
    if mcp.get("mcpServers").is_none() {
        mcp["mcpServers"] = json!({});
    }
    Json(mcp)
}

async fn post_mcp_config(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    if let Err(err) = state.service.config().set_user_mcp(body) {
        return Json(json!({"status": "error", "message": err.to_string()}));
    }
    state.service.config().load();
    state.service.update_mcp_servers();
    Json(json!({"status": "ok"}))
}

async fn gh_login_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.service.copilot_session().login_status().await;
    Json(serde_json::to_value(&status).unwrap_or_else(|_| json!({})))
}

async fn gh_login(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.service.copilot_session();
    match session.login().await {
        Ok(verification) => {
            // Poll for the access token in the background while the user
            // activates the device code.
            tokio::spawn(async move {
                if let Err(err) = session.wait_for_access_token().await {
                    error!(error = %err, "github device flow did not complete");
                }
            });
            (
                StatusCode::OK,
                Json(serde_json::to_value(&verification).unwrap_or_else(|_| json!({}))),
            )
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": format!("Failed to get device verification info from GitHub: {}", err)
            })),
        ),
    }
}

async fn gh_logout(State(state): State<AppState>) -> Json<Value> {
    let status = state.service.copilot_session().logout().await;
    Json(serde_json::to_value(&status).unwrap_or_else(|_| json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbintel_core::config::{ConfigOptions, NbiConfig};
    use nbintel_core::ChatService;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn test_state() -> (AppState, tempfile::TempDir, tempfile::TempDir) {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        let config = Arc::new(NbiConfig::new(ConfigOptions {
            server_root_dir: "/work".to_string(),
            env_dir: Some(env.path().to_path_buf()),
            user_dir: Some(user.path().to_path_buf()),
        }));
        let service = ChatService::new(config).await;
        (AppState::new(service), env, user)
    }

    #[tokio::test]
    async fn test_capabilities_handler() {
        let (state, _env, _user) = test_state().await;
        let Json(capabilities) = get_capabilities(State(state)).await;

        assert!(capabilities["llm_providers"].is_array());
        assert!(capabilities["chat_participants"].is_array());
        assert_eq!(capabilities["default_chat_mode"], "ask");
    }

    #[tokio::test]
    async fn test_config_handler_whitelists_keys() {
        let (state, _env, _user) = test_state().await;

        let _ = post_config(
            State(state.clone()),
            Json(json!({
                "default_chat_mode": "agent",
                "not_a_setting": "ignored",
            })),
        )
        .await;

        assert_eq!(state.service.config().default_chat_mode(), "agent");
        assert!(state.service.config().get("not_a_setting").is_none());
    }

    #[tokio::test]
    async fn test_mcp_config_roundtrip() {
        let (state, _env, _user) = test_state().await;

        let Json(initial) = get_mcp_config(State(state.clone())).await;
        assert_eq!(initial["mcpServers"], json!({}));

        let Json(result) = post_mcp_config(
            State(state.clone()),
            Json(json!({"mcpServers": {"files": {"command": "echo"}}})),
        )
        .await;
        assert_eq!(result["status"], "ok");
        assert!(state.service.mcp_server("files").is_some());

        let Json(result) = post_mcp_config(State(state.clone()), Json(json!("bogus"))).await;
        assert_eq!(result["status"], "error");
    }

    #[tokio::test]
    async fn test_reload_mcp_servers_lists_servers() {
        let (state, _env, _user) = test_state().await;
        state
            .service
            .config()
            .set_user_mcp(json!({"mcpServers": {"docs": {"url": "http://localhost"}}}))
            .unwrap();

        let Json(result) = reload_mcp_servers(State(state)).await;
        let servers = result["mcpServers"].as_array().unwrap();
        assert!(servers.iter().any(|s| s["id"] == "docs"));
    }

    #[tokio::test]
    async fn test_gh_login_status_defaults_to_logged_out() {
        let (state, _env, _user) = test_state().await;
        let Json(status) = gh_login_status(State(state)).await;
        assert_eq!(status["status"], "not-logged-in");
    }

    #[tokio::test]
    async fn test_router_builds() {
        let (state, _env, _user) = test_state().await;
        let _router = router(state);
    }
}
