//! Event stream port
//!
//! Streaming chunks flow from providers to a [`ChunkSink`]. A query with
//! streaming enabled owns one [`EventStream`] that receives every target's
//! chunks and is finalized once the query reaches a terminal phase.

use async_trait::async_trait;
use conductor_domain::{Chunk, Query};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a chunk sink. A sink error aborts the stream feeding it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Event stream closed")]
    Closed,

    #[error("Event stream write failed: {0}")]
    Write(String),
}

/// Receiver of streaming chunks.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn on_chunk(&self, chunk: &Chunk) -> Result<(), SinkError>;
}

/// Per-query stream observed by external clients.
#[async_trait]
pub trait EventStream: ChunkSink {
    /// Tell observers that no more chunks will follow.
    async fn notify_completion(&self) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError>;
}

/// Creates the event stream of a streaming query.
#[async_trait]
pub trait EventStreamFactory: Send + Sync {
    async fn create(&self, query: &Query) -> Result<Arc<dyn EventStream>, SinkError>;
}

/// Sink that wraps every chunk with routing metadata before forwarding it.
pub struct TaggedSink {
    inner: Arc<dyn EventStream>,
    metadata: serde_json::Value,
}

impl TaggedSink {
    pub fn new(inner: Arc<dyn EventStream>, metadata: serde_json::Value) -> Self {
        Self { inner, metadata }
    }
}

#[async_trait]
impl ChunkSink for TaggedSink {
    async fn on_chunk(&self, chunk: &Chunk) -> Result<(), SinkError> {
        let tagged = chunk.clone().with_metadata(self.metadata.clone());
        self.inner.on_chunk(&tagged).await
    }
}
