//! Tools and tool argument binding.
//!
//! A tool is a named, schema-described callable the model may request.
//! Binding is tolerant: arguments may arrive as a JSON object, a raw
//! (possibly malformed) JSON string, or a bare scalar for tools with a
//! single parameter. Validation compares against the schema's required
//! properties only; optional parameters may be omitted.

use crate::error::CoreResult;
use crate::request::ChatRequest;
use crate::response::ResponseChannel;
use async_trait::async_trait;
use nbintel_provider::ToolDefinition;
use nbintel_util::parse_tolerant;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of a tool's pre-invocation check.
#[derive(Debug, Clone, Default)]
pub struct PreInvokeResponse {
    /// Progress note streamed before invocation.
    pub message: Option<String>,
    /// Structured detail attached to the note.
    pub detail: Option<Value>,
    /// Confirmation dialog title. Confirmation is requested when the
    /// message below is present.
    pub confirmation_title: Option<String>,
    /// Confirmation dialog message.
    pub confirmation_message: Option<String>,
}

impl PreInvokeResponse {
    /// A progress note with no confirmation.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A progress note plus a confirmation request.
    pub fn with_confirmation(
        message: impl Into<String>,
        title: impl Into<String>,
        confirmation_message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            detail: None,
            confirmation_title: Some(title.into()),
            confirmation_message: Some(confirmation_message.into()),
        }
    }

    /// Attach structured detail to the note.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// A schema-described callable the model may request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, unique within the active tool set.
    fn name(&self) -> String;

    /// Short human title.
    fn title(&self) -> String {
        self.name()
    }

    /// Description shown to the model.
    fn description(&self) -> String;

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Pre-invocation check: progress note and optional confirmation.
    fn pre_invoke(&self, _request: &ChatRequest, _args: &Value) -> Option<PreInvokeResponse> {
        None
    }

    /// Execute the tool.
    async fn invoke(
        &self,
        request: &ChatRequest,
        response: &dyn ResponseChannel,
        tool_context: &Value,
        args: Value,
    ) -> CoreResult<Value>;
}

/// Boxed tool for dynamic dispatch.
pub type BoxedTool = Arc<dyn Tool>;

/// Build the provider-facing definition for a tool.
pub fn tool_definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name(),
        description: tool.description(),
        parameters: tool.parameters_schema(),
    }
}

/// A named group of tools with optional usage instructions that are
/// folded into the system prompt when the toolset is selected.
#[derive(Clone)]
pub struct Toolset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tools: Vec<BoxedTool>,
    pub instructions: Option<String>,
}

impl Toolset {
    /// Create a toolset.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        tools: Vec<BoxedTool>,
        instructions: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tools,
            instructions,
        }
    }

    /// Find a tool by name.
    pub fn tool(&self, name: &str) -> Option<BoxedTool> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }
}

/// Why argument binding failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgBindError {
    /// The raw argument string could not be parsed even tolerantly.
    Unparseable,
    /// A required property is missing after binding.
    MissingRequired(String),
}

impl std::fmt::Display for ArgBindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgBindError::Unparseable => write!(f, "arguments are not parseable"),
            ArgBindError::MissingRequired(name) => {
                write!(f, "missing required property '{}'", name)
            }
        }
    }
}

/// Bind model-supplied arguments against a parameters schema.
///
/// A raw string that does not open an object is kept as a bare scalar;
/// otherwise it is parsed tolerantly. A scalar binds to a one-property
/// schema as `{property: value}` and to anything else as `{}`. Missing
/// required properties fail the binding.
pub fn bind_tool_args(parameters: &Value, raw: &Value) -> Result<Value, ArgBindError> {
    let parsed = match raw {
        Value::String(s) => {
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') {
                parse_tolerant(s).map_err(|_| ArgBindError::Unparseable)?
            } else {
                Value::String(s.clone())
            }
        }
        other => other.clone(),
    };

    let properties = parameters
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let args = match parsed {
        Value::Object(map) => Value::Object(map),
        scalar => {
            if properties.len() == 1 {
                let property = properties.keys().next().cloned().unwrap_or_default();
                let mut map = Map::new();
                map.insert(property, scalar);
                Value::Object(map)
            } else {
                Value::Object(Map::new())
            }
        }
    };

    if let Some(required) = parameters.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if args.get(name).is_none() {
                return Err(ArgBindError::MissingRequired(name.to_string()));
            }
        }
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(properties: Value, required: Value) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    #[test]
    fn test_bind_native_object() {
        let parameters = schema(
            json!({"temperature": {"type": "number"}}),
            json!(["temperature"]),
        );
        let args = bind_tool_args(&parameters, &json!({"temperature": 72})).unwrap();
        assert_eq!(args, json!({"temperature": 72}));
    }

    #[test]
    fn test_bind_json_string() {
        let parameters = schema(
            json!({"temperature": {"type": "number"}}),
            json!(["temperature"]),
        );
        let args = bind_tool_args(&parameters, &json!("{\"temperature\": 72}")).unwrap();
        assert_eq!(args, json!({"temperature": 72}));
    }

    #[test]
    fn test_bind_fuzzy_json_string() {
        let parameters = schema(
            json!({"temperature": {"type": "number"}}),
            json!(["temperature"]),
        );
        // missing closing brace, unquoted key
        let args = bind_tool_args(&parameters, &json!("{temperature: 100")).unwrap();
        assert_eq!(args, json!({"temperature": 100}));
    }

    #[test]
    fn test_bind_bare_scalar_single_property() {
        let parameters = schema(json!({"source": {"type": "string"}}), json!(["source"]));
        let args = bind_tool_args(&parameters, &json!("print('hi')")).unwrap();
        assert_eq!(args, json!({"source": "print('hi')"}));
    }

    #[test]
    fn test_bind_bare_scalar_multi_property_is_empty() {
        let parameters = schema(
            json!({"a": {"type": "string"}, "b": {"type": "string"}}),
            json!([]),
        );
        let args = bind_tool_args(&parameters, &json!("just text")).unwrap();
        assert_eq!(args, json!({}));
    }

    #[test]
    fn test_missing_required_property_fails() {
        let parameters = schema(
            json!({"path": {"type": "string"}, "source": {"type": "string"}}),
            json!(["path", "source"]),
        );
        let result = bind_tool_args(&parameters, &json!({"path": "nb.ipynb"}));
        assert_eq!(
            result,
            Err(ArgBindError::MissingRequired("source".to_string()))
        );
    }

    #[test]
    fn test_optional_properties_may_be_omitted() {
        let parameters = schema(
            json!({"path": {"type": "string"}, "height": {"type": "number"}}),
            json!(["path"]),
        );
        let args = bind_tool_args(&parameters, &json!({"path": "nb.ipynb"})).unwrap();
        assert_eq!(args, json!({"path": "nb.ipynb"}));
    }

    #[test]
    fn test_number_scalar_wraps_single_property() {
        let parameters = schema(
            json!({"cell_index": {"type": "integer"}}),
            json!(["cell_index"]),
        );
        let args = bind_tool_args(&parameters, &json!(3)).unwrap();
        assert_eq!(args, json!({"cell_index": 3}));
    }
}
