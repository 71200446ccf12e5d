//! OpenAI-compatible chat-completion provider
//!
//! Unary calls POST `{base}/chat/completions`; streaming calls set
//! `stream: true` and fold the SSE chunk sequence through a
//! [`StreamAssembler`], forwarding every chunk to the sink as it arrives.

use super::wire::{ChatRequest, ChatResponse, WireChunk};
use super::{check_status, transport_error};
use crate::sse::SseDecoder;
use async_trait::async_trait;
use conductor_application::ports::chat_provider::{ChatProvider, ProviderError};
use conductor_application::ports::event_stream::ChunkSink;
use conductor_domain::{
    Chunk, Completion, Message, ModelProperties, ModelResource, ProviderKind, StreamAssembler,
    ToolDefinition,
};
use futures::StreamExt;
use tracing::{debug, trace, warn};

/// How requests are authenticated.
#[derive(Debug, Clone)]
pub(super) enum Credentials {
    Bearer(Option<String>),
    ApiKeyHeader(String),
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    credentials: Credentials,
    query: Vec<(&'static str, String)>,
    properties: ModelProperties,
    kind: ProviderKind,
}

impl OpenAiProvider {
    /// Provider for a plain OpenAI-compatible endpoint.
    pub fn openai(client: reqwest::Client, model: &ModelResource) -> Self {
        Self {
            client,
            base_url: model.base_url.trim_end_matches('/').to_string(),
            model: model.model.clone(),
            credentials: Credentials::Bearer(model.api_key.clone()),
            query: Vec::new(),
            properties: model.properties.clone(),
            kind: ProviderKind::OpenAi,
        }
    }

    pub(super) fn with_endpoint(
        client: reqwest::Client,
        model: &ModelResource,
        base_url: String,
        credentials: Credentials,
        query: Vec<(&'static str, String)>,
    ) -> Self {
        Self {
            client,
            base_url,
            model: model.model.clone(),
            credentials,
            query,
            properties: model.properties.clone(),
            kind: model.provider,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = match &self.credentials {
            Credentials::Bearer(Some(key)) => request.bearer_auth(key),
            Credentials::Bearer(None) => request,
            Credentials::ApiKeyHeader(key) => request.header("api-key", key),
        };
        if self.query.is_empty() {
            request
        } else {
            request.query(&self.query)
        }
    }

    async fn post(&self, body: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        trace!(url = %url, model = %self.model, stream = body.stream, "POST chat completion");
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        n: u32,
        tools: &[ToolDefinition],
    ) -> Result<Completion, ProviderError> {
        let request = ChatRequest::new(&self.model, messages, n, tools, &self.properties);
        let response = self.post(&request).await?;
        let body: ChatResponse = response.json().await.map_err(transport_error)?;
        Ok(Completion::from(body))
    }

    async fn chat_completion_stream(
        &self,
        messages: &[Message],
        n: u32,
        tools: &[ToolDefinition],
        sink: &dyn ChunkSink,
    ) -> Result<Completion, ProviderError> {
        let request =
            ChatRequest::new(&self.model, messages, n, tools, &self.properties).streaming();
        let response = self.post(&request).await?;

        let mut decoder = SseDecoder::new();
        let mut assembler = StreamAssembler::new();
        let mut body = response.bytes_stream();
        let mut done = false;

        while !done && let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(transport_error)?;
            for frame in decoder.push(&bytes) {
                if frame.is_done() {
                    done = true;
                    break;
                }
                forward(&frame.data, &mut assembler, sink).await?;
            }
        }
        if !done && let Some(frame) = decoder.finish().filter(|f| !f.is_done()) {
            forward(&frame.data, &mut assembler, sink).await?;
        }

        let assembled = assembler.finish().ok_or(ProviderError::EmptyStream)?;
        if let Some(final_chunk) = &assembled.final_chunk {
            sink.on_chunk(final_chunk).await?;
        }
        debug!(
            model = %self.model,
            tool_calls = assembled.completion.first_message().map_or(0, |m| m.tool_calls().len()),
            "Stream assembled"
        );
        Ok(assembled.completion)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.kind {
            // Deployments expose no model listing; a minimal completion proves access.
            ProviderKind::Azure => self
                .chat_completion(&[Message::user("test")], 1, &[])
                .await
                .map(|_| ()),
            _ => {
                let url = format!("{}/models", self.base_url);
                let response = self
                    .authorize(self.client.get(&url))
                    .send()
                    .await
                    .map_err(transport_error)?;
                check_status(response).await.map(|_| ())
            }
        }
    }
}

/// Parse and forward every chunk in one frame's data.
///
/// Servers that omit the blank line between events leave several JSON
/// documents in one frame, one per line.
async fn forward(
    data: &str,
    assembler: &mut StreamAssembler,
    sink: &dyn ChunkSink,
) -> Result<(), ProviderError> {
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        let chunk = match serde_json::from_str::<WireChunk>(line) {
            Ok(wire) => Chunk::from(wire),
            Err(e) => {
                warn!(error = %e, "Skipping malformed stream chunk");
                continue;
            }
        };
        assembler.accumulate(&chunk);
        sink.on_chunk(&chunk).await?;
    }
    Ok(())
}
