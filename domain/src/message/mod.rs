//! Conversation messages exchanged with models, memory and tools.
//!
//! [`Message`] is a true sum type: one variant per role, so an assistant
//! message is the only one able to carry tool calls and a tool message is
//! the only one bound to a `tool_call_id`.

use serde::{Deserialize, Serialize};

/// Role of a message, detached from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A function call requested by a model.
///
/// `arguments` is kept as the raw JSON string the model produced; it is
/// only parsed by the executor that consumes it.
///
/// Serialized in the chat-completions shape
/// (`{id, type: "function", function: {name, arguments}}`) so stored
/// conversations stay readable by any OpenAI-compatible consumer. The flat
/// `{id, name, arguments}` form is still accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ToolCallRecord", from = "ToolCallRecord")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ToolCallRecord {
    Function {
        #[serde(default)]
        id: String,
        #[serde(rename = "type", default = "function_kind")]
        kind: String,
        function: FunctionRecord,
    },
    Flat {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<ToolCall> for ToolCallRecord {
    fn from(call: ToolCall) -> Self {
        ToolCallRecord::Function {
            id: call.id,
            kind: function_kind(),
            function: FunctionRecord {
                name: call.name,
                arguments: call.arguments,
            },
        }
    }
}

impl From<ToolCallRecord> for ToolCall {
    fn from(record: ToolCallRecord) -> Self {
        match record {
            ToolCallRecord::Function { id, function, .. } => {
                ToolCall::new(id, function.name, function.arguments)
            }
            ToolCallRecord::Flat {
                id,
                name,
                arguments,
            } => ToolCall::new(id, name, arguments),
        }
    }
}

/// Accept `null` where a string is expected.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument string as a JSON object.
    ///
    /// An empty argument string is treated as `{}`.
    pub fn parse_arguments(
        &self,
    ) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        serde_json::from_str(&self.arguments)
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, deserialize_with = "null_as_empty")]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Text content regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool calls carried by an assistant message; empty for every other role.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Decode a stored message record.
    ///
    /// The tagged representation is tried first. Records that do not match
    /// it fall back to plain `{role, content}`, and roles that are not
    /// recognised degrade to a user message.
    pub fn from_record(record: &serde_json::Value) -> Self {
        if let Ok(message) = serde_json::from_value::<Message>(record.clone()) {
            return message;
        }

        let content = record
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        match record.get("role").and_then(|r| r.as_str()) {
            Some("system") => Message::System { content },
            Some("assistant") => Message::assistant(content),
            Some("tool") => match record.get("tool_call_id").and_then(|id| id.as_str()) {
                Some(id) => Message::tool(id, content),
                None => Message::User { content },
            },
            _ => Message::User { content },
        }
    }
}

/// Split the input of a target into the current message and prior context.
///
/// The last message is the one being answered; everything before it is
/// prepended to the loaded history.
pub fn split_current(input: &[Message]) -> Option<(&Message, &[Message])> {
    input.split_last()
}
