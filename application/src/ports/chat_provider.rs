//! Chat provider port
//!
//! Defines the interface every model backend implements. Backends map
//! their native wire shapes to and from the domain's
//! [`Message`]/[`Completion`] model.

use super::event_stream::{ChunkSink, SinkError};
use async_trait::async_trait;
use conductor_domain::{Chunk, Completion, Message, ModelResource, ToolDefinition};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("streaming completed but no response was accumulated")]
    EmptyStream,

    #[error("Model configuration error: {0}")]
    Configuration(String),

    #[error("Chunk sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Timeout")]
    Timeout,
}

/// Chat-completion capability bound to one backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Backend model id
    fn model(&self) -> &str;

    async fn chat_completion(
        &self,
        messages: &[Message],
        n: u32,
        tools: &[ToolDefinition],
    ) -> Result<Completion, ProviderError>;

    /// Stream a completion, forwarding every chunk to `sink`.
    ///
    /// The default runs the unary call and synthesizes one terminal chunk
    /// per choice, so backends without native streaming keep the contract.
    async fn chat_completion_stream(
        &self,
        messages: &[Message],
        n: u32,
        tools: &[ToolDefinition],
        sink: &dyn ChunkSink,
    ) -> Result<Completion, ProviderError> {
        let completion = self.chat_completion(messages, n, tools).await?;
        for chunk in Chunk::synthesize_from(&completion) {
            sink.on_chunk(&chunk).await?;
        }
        Ok(completion)
    }

    /// Lightweight availability check.
    async fn health_check(&self) -> Result<(), ProviderError> {
        self.chat_completion(&[Message::user("ping")], 1, &[])
            .await
            .map(|_| ())
    }
}

/// Builds a provider for a model resource.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, model: &ModelResource) -> Result<Arc<dyn ChatProvider>, ProviderError>;
}
