//! Incremental streaming chunks.
//!
//! The shape mirrors OpenAI-compatible `chat.completion.chunk` payloads,
//! which every backend is normalised into before it reaches a sink.

use super::entities::{Completion, FinishReason, TokenUsage};
use crate::message::{Role, ToolCall};
use serde::{Deserialize, Serialize};

/// Fragment of one tool call inside a streaming delta.
///
/// The first fragment for an `index` carries `id` and `name`; later
/// fragments for the same index only carry an `arguments` suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    /// A delta describing a fully assembled call.
    pub fn complete(index: usize, call: &ToolCall) -> Self {
        Self {
            index,
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            arguments: Some(call.arguments.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One streaming chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Routing information added by the engine (query and target identity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Chunk {
    /// A chunk carrying a single content delta.
    pub fn content(id: impl Into<String>, model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    content: Some(text.into()),
                    ..Default::default()
                },
                finish_reason: None,
            }],
            usage: None,
            metadata: None,
        }
    }

    /// Terminal chunks standing in for a stream the backend never produced.
    ///
    /// One chunk per choice, each carrying the full message and its finish
    /// reason, so sinks observe the same information a real stream delivers.
    pub fn synthesize_from(completion: &Completion) -> Vec<Chunk> {
        completion
            .choices
            .iter()
            .map(|choice| Chunk {
                id: completion.id.clone(),
                model: completion.model.clone(),
                choices: vec![ChunkChoice {
                    index: choice.index,
                    delta: Delta {
                        role: Some(Role::Assistant),
                        content: Some(choice.message.content().to_string()),
                        tool_calls: choice
                            .message
                            .tool_calls()
                            .iter()
                            .enumerate()
                            .map(|(i, call)| ToolCallDelta::complete(i, call))
                            .collect(),
                    },
                    finish_reason: Some(choice.finish_reason.clone()),
                }],
                usage: (!completion.usage.is_empty()).then_some(completion.usage),
                metadata: None,
            })
            .collect()
    }

    /// Attach engine metadata, replacing any present.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::entities::Choice;
    use crate::message::Message;
    use serde_json::json;

    #[test]
    fn test_deserialize_openai_chunk() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 0, "id": "call_1", "type": "function", "name": "get_x"}]},
                "finish_reason": null
            }]
        });
        let chunk: Chunk = serde_json::from_value(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.tool_calls[0].id.as_deref(), Some("call_1"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_synthesize_one_chunk_per_choice() {
        let completion = Completion {
            id: "resp".to_string(),
            model: "claude".to_string(),
            choices: vec![
                Choice {
                    index: 0,
                    message: Message::assistant("a"),
                    finish_reason: FinishReason::Stop,
                },
                Choice {
                    index: 1,
                    message: Message::assistant_with_tool_calls(
                        "",
                        vec![ToolCall::new("t1", "lookup", "{}")],
                    ),
                    finish_reason: FinishReason::ToolCalls,
                },
            ],
            usage: TokenUsage::new(3, 4),
        };

        let chunks = Chunk::synthesize_from(&completion);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunks[1].choices[0].index, 1);
        assert_eq!(chunks[1].choices[0].delta.tool_calls[0].name.as_deref(), Some("lookup"));
        assert_eq!(chunks[1].choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(chunks[0].usage.map(|u| u.total_tokens), Some(7));
    }
}
