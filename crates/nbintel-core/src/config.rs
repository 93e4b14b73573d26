//! Layered configuration store.
//!
//! Two layers of JSON files: environment-level config shared by an
//! installation and user-level config that overrides it. Each layer has
//! a `config.json` for settings and an `mcp.json` for MCP servers and
//! participants. Only the user layer is ever written.

use crate::error::{CoreError, CoreResult};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

const CONFIG_FILE: &str = "config.json";
const MCP_FILE: &str = "mcp.json";

/// Options for creating a config store.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Root directory the server serves files from.
    pub server_root_dir: String,
    /// Environment-level config directory override.
    pub env_dir: Option<PathBuf>,
    /// User-level config directory override.
    pub user_dir: Option<PathBuf>,
}

/// Layered key/value configuration persisted as JSON.
#[derive(Debug)]
pub struct NbiConfig {
    server_root_dir: String,
    env_dir: PathBuf,
    user_dir: PathBuf,
    env_config: Mutex<Map<String, Value>>,
    user_config: Mutex<Map<String, Value>>,
    env_mcp: Mutex<Value>,
    user_mcp: Mutex<Value>,
}

impl NbiConfig {
    /// Create a store and load both layers from disk.
    pub fn new(options: ConfigOptions) -> Self {
        let env_dir = options.env_dir.unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("/usr/local/share"))
                .join("nbintel")
        });
        let user_dir = options.user_dir.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nbintel")
        });

        let config = Self {
            server_root_dir: options.server_root_dir,
            env_dir,
            user_dir,
            env_config: Mutex::new(Map::new()),
            user_config: Mutex::new(Map::new()),
            env_mcp: Mutex::new(json!({})),
            user_mcp: Mutex::new(json!({})),
        };
        config.load();
        config
    }

    /// Root directory the server serves files from.
    pub fn server_root_dir(&self) -> &str {
        &self.server_root_dir
    }

    /// User-level config directory.
    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Reload both layers from disk.
    pub fn load(&self) {
        *self.env_config.lock().unwrap() = read_object(&self.env_dir.join(CONFIG_FILE));
        *self.user_config.lock().unwrap() = read_object(&self.user_dir.join(CONFIG_FILE));
        *self.env_mcp.lock().unwrap() = read_value(&self.env_dir.join(MCP_FILE));
        *self.user_mcp.lock().unwrap() = read_value(&self.user_dir.join(MCP_FILE));
    }

    /// Persist the user layer.
    pub fn save(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.user_dir)?;

        let user_config = Value::Object(self.user_config.lock().unwrap().clone());
        std::fs::write(
            self.user_dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(&user_config)?,
        )?;

        let user_mcp = self.user_mcp.lock().unwrap().clone();
        std::fs::write(
            self.user_dir.join(MCP_FILE),
            serde_json::to_string_pretty(&user_mcp)?,
        )?;

        Ok(())
    }

    /// Get a setting, user layer over environment layer.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.user_config.lock().unwrap().get(key) {
            return Some(value.clone());
        }
        self.env_config.lock().unwrap().get(key).cloned()
    }

    /// Get a setting with a default.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Set a user-level setting and persist.
    pub fn set(&self, key: &str, value: Value) -> CoreResult<()> {
        self.user_config
            .lock()
            .unwrap()
            .insert(key.to_string(), value);
        self.save()
    }

    /// The configured chat model reference `{provider, model, properties}`.
    pub fn chat_model(&self) -> Value {
        self.get_or(
            "chat_model",
            json!({"provider": "github-copilot", "model": "gpt-4.1"}),
        )
    }

    /// The configured inline completion model reference.
    pub fn inline_completion_model(&self) -> Value {
        self.get_or(
            "inline_completion_model",
            json!({"provider": "github-copilot", "model": "gpt-4o-copilot"}),
        )
    }

    /// Default chat mode for new conversations.
    pub fn default_chat_mode(&self) -> String {
        self.get_or("default_chat_mode", json!("ask"))
            .as_str()
            .unwrap_or("ask")
            .to_string()
    }

    /// Whether the configured models use the GitHub Copilot service.
    pub fn using_github_copilot_service(&self) -> bool {
        let provider = |model: Value| {
            model
                .get("provider")
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        provider(self.chat_model()).as_deref() == Some("github-copilot")
            || provider(self.inline_completion_model()).as_deref() == Some("github-copilot")
    }

    /// MCP configuration, user layer merged over environment layer.
    pub fn mcp(&self) -> Value {
        let mut merged = self
            .env_mcp
            .lock()
            .unwrap()
            .as_object()
            .cloned()
            .unwrap_or_default();
        if let Some(user) = self.user_mcp.lock().unwrap().as_object() {
            for (key, value) in user {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }

    /// Replace the user-level MCP configuration and persist.
    pub fn set_user_mcp(&self, mcp: Value) -> CoreResult<()> {
        if !mcp.is_object() {
            return Err(CoreError::config("mcp configuration must be an object"));
        }
        *self.user_mcp.lock().unwrap() = mcp;
        self.save()
    }
}

fn read_object(path: &Path) -> Map<String, Value> {
    match read_value(path) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn read_value(path: &Path) -> Value {
    if !path.exists() {
        return json!({});
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "invalid config file");
                json!({})
            }
        },
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to read config file");
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(env: &Path, user: &Path) -> NbiConfig {
        NbiConfig::new(ConfigOptions {
            server_root_dir: "/work".to_string(),
            env_dir: Some(env.to_path_buf()),
            user_dir: Some(user.to_path_buf()),
        })
    }

    #[test]
    fn test_defaults_without_files() {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        let config = config_in(env.path(), user.path());

        assert_eq!(config.default_chat_mode(), "ask");
        assert_eq!(config.chat_model()["provider"], "github-copilot");
        assert!(config.using_github_copilot_service());
        assert_eq!(config.mcp(), json!({}));
    }

    #[test]
    fn test_user_layer_overrides_env_layer() {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        std::fs::write(
            env.path().join(CONFIG_FILE),
            r#"{"default_chat_mode": "agent", "chat_model": {"provider": "ollama", "model": "llama3.2"}}"#,
        )
        .unwrap();
        std::fs::write(
            user.path().join(CONFIG_FILE),
            r#"{"default_chat_mode": "ask"}"#,
        )
        .unwrap();

        let config = config_in(env.path(), user.path());
        assert_eq!(config.default_chat_mode(), "ask");
        assert_eq!(config.chat_model()["provider"], "ollama");
        assert!(!config.using_github_copilot_service());
    }

    #[test]
    fn test_set_persists_and_reloads() {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        let config = config_in(env.path(), user.path());

        config
            .set("default_chat_mode", json!("agent"))
            .unwrap();

        let reloaded = config_in(env.path(), user.path());
        assert_eq!(reloaded.default_chat_mode(), "agent");
    }

    #[test]
    fn test_mcp_merge() {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        std::fs::write(
            env.path().join(MCP_FILE),
            r#"{"mcpServers": {"env-server": {"command": "env"}}}"#,
        )
        .unwrap();
        std::fs::write(
            user.path().join(MCP_FILE),
            r#"{"mcpServers": {"user-server": {"command": "user"}}}"#,
        )
        .unwrap();

        let config = config_in(env.path(), user.path());
        let mcp = config.mcp();
        // User layer replaces whole keys, not a deep merge.
        assert!(mcp["mcpServers"]["user-server"].is_object());
        assert!(mcp["mcpServers"]["env-server"].is_null());
    }

    #[test]
    fn test_set_user_mcp() {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        let config = config_in(env.path(), user.path());

        config
            .set_user_mcp(json!({"mcpServers": {"files": {"command": "npx"}}}))
            .unwrap();
        assert!(config.mcp()["mcpServers"]["files"].is_object());

        assert!(config.set_user_mcp(json!("not an object")).is_err());
    }

    #[test]
    fn test_invalid_json_is_ignored() {
        let env = tempdir().unwrap();
        let user = tempdir().unwrap();
        std::fs::write(user.path().join(CONFIG_FILE), "{not json").unwrap();

        let config = config_in(env.path(), user.path());
        assert_eq!(config.default_chat_mode(), "ask");
    }
}
