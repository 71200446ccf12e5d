//! OpenAI-compatible chat-completion wire types
//!
//! The domain keeps tool calls flat (`{id, name, arguments}`); the wire
//! nests them under `function`. Everything here exists to translate
//! between the two.

use conductor_domain::{
    Chunk, ChunkChoice, Choice, Completion, Delta, FinishReason, Message, ModelProperties, Role,
    TokenUsage, ToolCall, ToolCallDelta, ToolDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub n: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct StreamOptions {
    pub include_usage: bool,
}

impl ChatRequest {
    pub fn new(
        model: &str,
        messages: &[Message],
        n: u32,
        tools: &[ToolDefinition],
        properties: &ModelProperties,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
            n: n.max(1),
            tools: tools.iter().map(WireTool::from).collect(),
            max_tokens: properties.max_tokens,
            temperature: properties.temperature,
            stream: false,
            stream_options: None,
        }
    }

    /// Switch the request to SSE streaming with a trailing usage chunk.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self.stream_options = Some(StreamOptions {
            include_usage: true,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct WireMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let mut wire = WireMessage {
            role: message.role(),
            content: Some(message.content().to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        match message {
            Message::Assistant { content, tool_calls } if !tool_calls.is_empty() => {
                if content.is_empty() {
                    wire.content = None;
                }
                wire.tool_calls = tool_calls.iter().map(WireToolCall::from).collect();
            }
            Message::Tool { tool_call_id, .. } => {
                wire.tool_call_id = Some(tool_call_id.clone());
            }
            _ => {}
        }
        wire
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        ToolCall::new(call.id, call.function.name, call.function.arguments)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireToolFunction,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireToolFunction {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

// ==================== Responses ====================

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    #[serde(default)]
    pub index: u32,
    pub message: WireResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

impl From<ChatResponse> for Completion {
    fn from(response: ChatResponse) -> Self {
        let choices = response
            .choices
            .into_iter()
            .map(|choice| {
                let calls: Vec<ToolCall> =
                    choice.message.tool_calls.into_iter().map(ToolCall::from).collect();
                let finish_reason = choice.finish_reason.unwrap_or(if calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                });
                Choice {
                    index: choice.index,
                    message: Message::assistant_with_tool_calls(
                        choice.message.content.unwrap_or_default(),
                        calls,
                    ),
                    finish_reason,
                }
            })
            .collect();

        Completion {
            id: response.id,
            model: response.model,
            choices,
            usage: response.usage.unwrap_or_default(),
        }
    }
}

// ==================== Streaming ====================

#[derive(Debug, Deserialize)]
pub(crate) struct WireChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<WireChunkChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: WireDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireDelta {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl From<WireChunk> for Chunk {
    fn from(chunk: WireChunk) -> Self {
        let choices = chunk
            .choices
            .into_iter()
            .map(|choice| ChunkChoice {
                index: choice.index,
                delta: Delta {
                    role: choice.delta.role,
                    content: choice.delta.content,
                    tool_calls: choice
                        .delta
                        .tool_calls
                        .unwrap_or_default()
                        .into_iter()
                        .map(|fragment| {
                            let function = fragment.function.unwrap_or_default();
                            ToolCallDelta {
                                index: fragment.index,
                                id: fragment.id,
                                name: function.name,
                                arguments: function.arguments,
                            }
                        })
                        .collect(),
                },
                finish_reason: choice.finish_reason,
            })
            .collect();

        Chunk {
            id: chunk.id,
            model: chunk.model,
            choices,
            usage: chunk.usage,
            metadata: None,
        }
    }
}

/// Error envelope returned by OpenAI-compatible backends.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}
