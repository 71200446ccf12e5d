//! Tool server port
//!
//! External tool servers are reached through a [`ToolServerConnector`],
//! which establishes one [`ToolServerClient`] per connection attempt. The
//! connection pool decides whether a failed attempt is worth repeating
//! from [`ConnectionError::is_retryable`].

use super::tool_executor::ToolExecutor;
use async_trait::async_trait;
use conductor_domain::{HttpToolSpec, ToolResource, ToolServerTransport};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Message fragments that identify transient network failures.
const RETRYABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "no such host",
    "network is unreachable",
    "timeout",
    "timed out",
    "temporary failure",
    "dns error",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("no such host: {0}")]
    Dns(String),

    #[error("connection timeout: {0}")]
    Timeout(String),

    #[error("temporary failure: {0}")]
    Transient(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("connection pool closed")]
    PoolClosed,

    #[error("connection attempt cancelled")]
    Cancelled,

    #[error("failed to create tool server client for {server} after {attempts} attempts: {source}")]
    Exhausted {
        server: String,
        attempts: u32,
        #[source]
        source: Box<ConnectionError>,
    },

    #[error("failed to close {} pooled client(s): {}", .0.len(), .0.join("; "))]
    CloseFailed(Vec<String>),

    #[error("{0}")]
    Other(String),
}

impl ConnectionError {
    /// Refused, DNS and transient/timeout failures are retryable; anything
    /// else is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectionError::Refused(_)
            | ConnectionError::Dns(_)
            | ConnectionError::Timeout(_)
            | ConnectionError::Transient(_) => true,
            ConnectionError::Other(message) => is_retryable_message(message),
            _ => false,
        }
    }
}

/// Classify a free-form error message against the known retryable set.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Everything needed to open one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// `namespace/name` of the server, used in diagnostics.
    pub server: String,
    /// Full endpoint URL including the transport sub-path.
    pub endpoint: String,
    pub transport: ToolServerTransport,
    /// Server headers with per-agent overrides already applied.
    pub headers: BTreeMap<String, String>,
    /// Request timeout; `None` for the eventing transport.
    pub timeout: Option<Duration>,
}

/// A tool published by a server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One item of a tool-call response.
#[derive(Debug, Clone, PartialEq)]
pub enum CallContent {
    Text(String),
    /// Any non-text content, kept as raw JSON.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallToolOutput {
    pub content: Vec<CallContent>,
    pub is_error: bool,
}

impl CallToolOutput {
    /// Text items concatenated; other items pretty-printed as JSON.
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for item in &self.content {
            match item {
                CallContent::Text(text) => rendered.push_str(text),
                CallContent::Other(value) => {
                    let pretty =
                        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                    rendered.push_str(&pretty);
                }
            }
        }
        rendered
    }
}

#[async_trait]
pub trait ToolServerClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ConnectionError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolOutput, ConnectionError>;

    async fn close(&self) -> Result<(), ConnectionError>;
}

#[async_trait]
pub trait ToolServerConnector: Send + Sync {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Arc<dyn ToolServerClient>, ConnectionError>;
}

/// Infrastructure-backed pieces the tool framework cannot build itself.
pub trait ToolBackends: Send + Sync {
    fn http_executor(&self, tool: &ToolResource, spec: &HttpToolSpec) -> Arc<dyn ToolExecutor>;

    fn connector(&self) -> Arc<dyn ToolServerConnector>;
}
