//! Model metadata and configurable properties.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Default context window when a model does not report one.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 4096;

/// Information about a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model ID within its provider.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Context window in tokens.
    pub context_window: u32,

    /// Configurable properties exposed to the front end.
    #[serde(default)]
    pub properties: Vec<ModelProperty>,
}

impl ModelInfo {
    /// Create model info with the default context window.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            properties: Vec::new(),
        }
    }

    /// Set the context window.
    pub fn with_context_window(mut self, context_window: u32) -> Self {
        self.context_window = context_window;
        self
    }

    /// Attach configurable properties.
    pub fn with_properties(mut self, properties: Vec<ModelProperty>) -> Self {
        self.properties = properties;
        self
    }
}

/// A configurable model/provider property (API key, base URL, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProperty {
    pub id: String,
    pub name: String,
    pub description: String,
    pub value: String,
    #[serde(default)]
    pub optional: bool,
}

impl ModelProperty {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        optional: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            value: String::new(),
            optional,
        }
    }
}

/// A thread-safe set of properties with get/set by id.
#[derive(Debug)]
pub struct PropertySet {
    properties: RwLock<Vec<ModelProperty>>,
}

impl PropertySet {
    /// Create a property set.
    pub fn new(properties: Vec<ModelProperty>) -> Self {
        Self {
            properties: RwLock::new(properties),
        }
    }

    /// Get a property value by id.
    pub fn get(&self, id: &str) -> Option<String> {
        self.properties
            .read()
            .ok()?
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.value.clone())
    }

    /// Get a property value, treating an empty string as absent.
    pub fn get_non_empty(&self, id: &str) -> Option<String> {
        self.get(id).filter(|v| !v.trim().is_empty())
    }

    /// Set a property value by id. Unknown ids are ignored.
    pub fn set(&self, id: &str, value: impl Into<String>) {
        if let Ok(mut properties) = self.properties.write() {
            if let Some(property) = properties.iter_mut().find(|p| p.id == id) {
                property.value = value.into();
            }
        }
    }

    /// Snapshot all properties.
    pub fn all(&self) -> Vec<ModelProperty> {
        self.properties.read().map(|p| p.clone()).unwrap_or_default()
    }

    /// Parse a numeric property, falling back to the default context window.
    pub fn context_window(&self) -> u32 {
        self.get_non_empty("context_window")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}
