//! Error types for the MCP client

use conductor_application::ports::tool_server::ConnectionError;
use thiserror::Error;

/// Result type alias for MCP operations
pub type Result<T> = std::result::Result<T, McpError>;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid header {0}")]
    InvalidHeader(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Event stream closed before the server announced its message endpoint")]
    MissingEndpoint,

    #[error("Transport closed")]
    TransportClosed,
}

/// Full text of an error and its sources, for message-based classification.
fn chain_text(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

impl From<McpError> for ConnectionError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Transport(e) => {
                let text = chain_text(&e);
                let lower = text.to_lowercase();
                if e.is_timeout() {
                    ConnectionError::Timeout(text)
                } else if lower.contains("dns error") || lower.contains("no such host") {
                    ConnectionError::Dns(text)
                } else if lower.contains("connection refused") {
                    ConnectionError::Refused(text)
                } else {
                    ConnectionError::Other(text)
                }
            }
            McpError::Http { status, message } if matches!(status, 502..=504) => {
                ConnectionError::Transient(format!("HTTP {status}: {message}"))
            }
            McpError::Http { status, message } => ConnectionError::Http { status, message },
            McpError::TransportClosed => ConnectionError::Transient("transport closed".to_string()),
            other => ConnectionError::Protocol(other.to_string()),
        }
    }
}
