//! Tool definitions and the transforms an agent may apply to them.

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A named value bound to a tool function or parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl ToolFunction {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Partial application of a tool.
///
/// `name` renames the tool as the model sees it; every entry in
/// `parameters` is removed from the schema and injected at call time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPartial {
    pub name: Option<String>,
    pub parameters: Vec<ToolFunction>,
}

/// Definition of a tool as exposed to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

/// Schema used when a tool declares no input schema.
pub fn default_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: default_parameters(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Derive the definition a partial exposes.
    ///
    /// Bound parameters disappear from both `properties` and `required`.
    /// The base schema must carry a `properties` object.
    pub fn apply_partial(&self, partial: &ToolPartial) -> Result<ToolDefinition, DomainError> {
        let mut parameters = self.parameters.clone();

        let properties = parameters
            .get_mut("properties")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| DomainError::PartialTransform {
                tool: self.name.clone(),
                reason: "schema has no properties object".to_string(),
            })?;
        for bound in &partial.parameters {
            properties.remove(&bound.name);
        }

        if let Some(required) = parameters.get_mut("required").and_then(Value::as_array_mut) {
            required.retain(|r| {
                r.as_str()
                    .is_none_or(|name| !partial.parameters.iter().any(|p| p.name == name))
            });
        }

        Ok(ToolDefinition {
            name: partial
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.name.clone()),
            description: self.description.clone(),
            parameters,
        })
    }

    /// OpenAI `tools` array entry.
    pub fn to_openai_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}
