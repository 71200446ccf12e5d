//! Reassembly of streamed chunks into a [`Completion`].
//!
//! Tool calls arrive fragmented across chunks and are keyed by their
//! numeric index. A `BTreeMap` keeps them in index order so the final
//! message lists them exactly as the model enumerated them, whatever
//! order the fragments were interleaved in.
//!
//! ```
//! use conductor_domain::completion::{Chunk, ChunkChoice, Delta, StreamAssembler, ToolCallDelta};
//!
//! let fragment = |id: Option<&str>, name: Option<&str>, args: &str| Chunk {
//!     id: "chatcmpl-1".to_string(),
//!     choices: vec![ChunkChoice {
//!         delta: Delta {
//!             tool_calls: vec![ToolCallDelta {
//!                 index: 0,
//!                 id: id.map(String::from),
//!                 name: name.map(String::from),
//!                 arguments: Some(args.to_string()),
//!             }],
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let mut assembler = StreamAssembler::new();
//! assembler.accumulate(&fragment(Some("call_1"), Some("get_x"), ""));
//! assembler.accumulate(&fragment(None, None, "{\"a\""));
//! assembler.accumulate(&fragment(None, None, ":1}"));
//!
//! let assembled = assembler.finish().unwrap();
//! let calls = assembled.completion.choices[0].message.tool_calls();
//! assert_eq!(calls.len(), 1);
//! assert_eq!(calls[0].arguments, "{\"a\":1}");
//! ```

use super::chunk::{Chunk, ChunkChoice, Delta, ToolCallDelta};
use super::entities::{Choice, Completion, FinishReason, TokenUsage};
use crate::message::{Message, Role, ToolCall};
use std::collections::BTreeMap;

/// Result of a finished stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub completion: Completion,
    /// Synthetic chunk carrying the complete tool-call set, present only
    /// when the stream produced tool calls.
    pub final_chunk: Option<Chunk>,
}

/// Per-stream accumulation state. Scoped to one streaming call.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    started: bool,
    id: String,
    model: String,
    role: Option<Role>,
    content: String,
    finish_reason: Option<FinishReason>,
    tool_calls: BTreeMap<usize, ToolCall>,
    usage: Option<TokenUsage>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the running state.
    pub fn accumulate(&mut self, chunk: &Chunk) {
        if !self.started {
            self.started = true;
            self.id = chunk.id.clone();
            self.model = chunk.model.clone();
        }

        if let Some(usage) = chunk.usage
            && usage.total_tokens > 0
        {
            self.usage = Some(usage);
        }

        let Some(choice) = chunk.choices.first() else {
            return;
        };

        if self.role.is_none() {
            self.role = choice.delta.role;
        }

        if let Some(content) = &choice.delta.content {
            self.content.push_str(content);
        }

        for fragment in &choice.delta.tool_calls {
            self.accumulate_tool_call(fragment);
        }

        if let Some(reason) = &choice.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
    }

    fn accumulate_tool_call(&mut self, fragment: &ToolCallDelta) {
        let arguments = fragment.arguments.as_deref().unwrap_or_default();
        match self.tool_calls.get_mut(&fragment.index) {
            Some(call) => {
                call.arguments.push_str(arguments);
                if call.id.is_empty()
                    && let Some(id) = &fragment.id
                {
                    call.id = id.clone();
                }
                if call.name.is_empty()
                    && let Some(name) = &fragment.name
                {
                    call.name = name.clone();
                }
            }
            None => {
                self.tool_calls.insert(
                    fragment.index,
                    ToolCall::new(
                        fragment.id.clone().unwrap_or_default(),
                        fragment.name.clone().unwrap_or_default(),
                        arguments,
                    ),
                );
            }
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Materialise the completion.
    ///
    /// Returns `None` when no chunk was ever accumulated.
    pub fn finish(self) -> Option<Assembled> {
        if !self.started {
            return None;
        }

        let tool_calls: Vec<ToolCall> = self.tool_calls.into_values().collect();
        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        let final_chunk = (!tool_calls.is_empty()).then(|| Chunk {
            id: self.id.clone(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: Some(Role::Assistant),
                    content: None,
                    tool_calls: tool_calls
                        .iter()
                        .enumerate()
                        .map(|(i, call)| ToolCallDelta::complete(i, call))
                        .collect(),
                },
                finish_reason: Some(finish_reason.clone()),
            }],
            usage: None,
            metadata: None,
        });

        let completion = Completion {
            id: self.id,
            model: self.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant_with_tool_calls(self.content, tool_calls),
                finish_reason,
            }],
            usage: self.usage.unwrap_or_default(),
        };

        Some(Assembled {
            completion,
            final_chunk,
        })
    }
}
