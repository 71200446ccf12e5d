//! Conversation memory port
//!
//! A [`Memory`] is bound to one conversation. The factory resolves which
//! memory a query uses and performs any setup (such as creating the
//! conversation) before targets run.

use async_trait::async_trait;
use conductor_domain::{Message, Query};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory service unreachable: {0}")]
    Unreachable(String),

    #[error("Memory request failed (HTTP {status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Memory response invalid: {0}")]
    InvalidResponse(String),

    #[error("Memory not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait Memory: Send + Sync {
    fn conversation_id(&self) -> Option<String>;

    /// Ordered history of the conversation.
    async fn get_messages(&self) -> Result<Vec<Message>, MemoryError>;

    /// Append messages produced while answering `query_id`.
    async fn add_messages(&self, query_id: &str, messages: &[Message]) -> Result<(), MemoryError>;
}

#[async_trait]
pub trait MemoryFactory: Send + Sync {
    async fn for_query(&self, query: &Query) -> Result<Arc<dyn Memory>, MemoryError>;
}

/// Memory that remembers nothing.
#[derive(Debug, Default, Clone)]
pub struct NoopMemory;

#[async_trait]
impl Memory for NoopMemory {
    fn conversation_id(&self) -> Option<String> {
        None
    }

    async fn get_messages(&self) -> Result<Vec<Message>, MemoryError> {
        Ok(Vec::new())
    }

    async fn add_messages(&self, _query_id: &str, _messages: &[Message]) -> Result<(), MemoryError> {
        Ok(())
    }
}

#[async_trait]
impl MemoryFactory for NoopMemory {
    async fn for_query(&self, _query: &Query) -> Result<Arc<dyn Memory>, MemoryError> {
        Ok(Arc::new(NoopMemory))
    }
}
