//! Bedrock-style JSON model invocation
//!
//! One POST to `{base_url}/model/{model}/invoke` with an Anthropic
//! messages body. There is no native streaming; the port's default
//! synthesizes terminal chunks from the unary result.

use super::{check_status, transport_error};
use async_trait::async_trait;
use conductor_application::ports::chat_provider::{ChatProvider, ProviderError};
use conductor_domain::{
    Choice, Completion, FinishReason, Message, ModelProperties, ModelResource, TokenUsage,
    ToolCall, ToolDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 1.0;
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Serialize)]
struct InvokeRequest {
    messages: Vec<InvokeMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anthropic_version: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<InvokeTool>,
}

#[derive(Debug, PartialEq, Serialize)]
struct InvokeMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize)]
struct InvokeTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: InvokeUsage,
}

/// Lenient view of a response block; unknown block types are ignored.
#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct InvokeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct BedrockProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    properties: ModelProperties,
}

impl BedrockProvider {
    pub fn new(client: reqwest::Client, model: &ModelResource) -> Self {
        Self {
            client,
            base_url: model.base_url.trim_end_matches('/').to_string(),
            model: model.model.clone(),
            api_key: model.api_key.clone(),
            properties: model.properties.clone(),
        }
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition]) -> InvokeRequest {
        let (messages, system) = convert_messages(messages);
        InvokeRequest {
            messages,
            max_tokens: self.properties.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.properties.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            system,
            anthropic_version: self
                .model
                .to_lowercase()
                .contains("claude")
                .then_some(ANTHROPIC_VERSION),
            tools: tools
                .iter()
                .map(|t| InvokeTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        }
    }
}

/// Split out system text and map the rest onto user/assistant turns.
///
/// Tool results become user `tool_result` blocks. Consecutive turns of the
/// same role are merged, since the backend requires alternation.
fn convert_messages(messages: &[Message]) -> (Vec<InvokeMessage>, Option<String>) {
    let mut system: Vec<&str> = Vec::new();
    let mut turns: Vec<InvokeMessage> = Vec::new();

    for message in messages {
        let (role, blocks) = match message {
            Message::System { content } => {
                if !content.is_empty() {
                    system.push(content);
                }
                continue;
            }
            Message::User { content } => ("user", text_block(content)),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = text_block(content);
                blocks.extend(tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: serde_json::from_str(&call.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default())),
                }));
                ("assistant", blocks)
            }
            Message::Tool {
                tool_call_id,
                content,
            } => (
                "user",
                vec![ContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.clone(),
                }],
            ),
        };
        if blocks.is_empty() {
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => turns.push(InvokeMessage {
                role,
                content: blocks,
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (turns, system)
}

fn text_block(content: &str) -> Vec<ContentBlock> {
    if content.is_empty() {
        Vec::new()
    } else {
        vec![ContentBlock::Text {
            text: content.to_string(),
        }]
    }
}

fn finish_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

impl From<InvokeResponse> for Completion {
    fn from(response: InvokeResponse) -> Self {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block.kind.as_str() {
                "text" => content.push_str(block.text.as_deref().unwrap_or_default()),
                "tool_use" => {
                    let arguments = block
                        .input
                        .as_ref()
                        .and_then(|input| serde_json::to_string(input).ok())
                        .unwrap_or_else(|| "{}".to_string());
                    tool_calls.push(ToolCall::new(
                        block.id.unwrap_or_default(),
                        block.name.unwrap_or_default(),
                        arguments,
                    ));
                }
                _ => {}
            }
        }

        Completion {
            id: response.id,
            model: response.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant_with_tool_calls(content, tool_calls),
                finish_reason: finish_reason(response.stop_reason.as_deref()),
            }],
            usage: TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens),
        }
    }
}

#[async_trait]
impl ChatProvider for BedrockProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        _n: u32,
        tools: &[ToolDefinition],
    ) -> Result<Completion, ProviderError> {
        let url = format!("{}/model/{}/invoke", self.base_url, self.model);
        trace!(url = %url, "Invoking model");

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&self.build_request(messages, tools));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let body: InvokeResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(Completion::from(body))
    }
}
