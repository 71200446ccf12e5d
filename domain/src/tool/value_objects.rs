//! Tool execution outcomes and executor classification

use crate::message::Message;
use serde::{Deserialize, Serialize};

/// Outcome of one tool call: content on success, error text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutput {
    Content(String),
    Error(String),
}

/// Result of executing a [`ToolCall`](crate::message::ToolCall).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub output: ToolOutput,
}

impl ToolResult {
    pub fn success(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: ToolOutput::Content(content.into()),
        }
    }

    pub fn failure(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: ToolOutput::Error(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error(_))
    }

    /// Content on success, error text on failure.
    pub fn text(&self) -> &str {
        match &self.output {
            ToolOutput::Content(s) | ToolOutput::Error(s) => s,
        }
    }

    /// The `tool` message returned to the model.
    pub fn to_message(&self) -> Message {
        Message::tool(self.id.clone(), self.text())
    }
}

/// Classification of an executor, used for telemetry and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Builtin,
    Http,
    Mcp,
    Agent,
    Partial,
    Filtered,
    Unknown,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Builtin => "builtin",
            ToolKind::Http => "http",
            ToolKind::Mcp => "mcp",
            ToolKind::Agent => "agent",
            ToolKind::Partial => "partial",
            ToolKind::Filtered => "filtered",
            ToolKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_becomes_tool_message_with_error_text() {
        let result = ToolResult::failure("c1", "weather", "tool weather not found");
        assert!(result.is_error());
        assert_eq!(
            result.to_message(),
            Message::tool("c1", "tool weather not found")
        );
    }

    #[test]
    fn test_output_serialization() {
        let result = ToolResult::success("c1", "noop", "ok");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["output"]["content"], "ok");
    }
}
