//! Tool executor port
//!
//! Every executor variant (HTTP, tool server, agent delegate, builtin and
//! the partial/filter decorators) implements [`ToolExecutor`]. A failed
//! call returns a [`ToolFailure`], which carries the error-bearing
//! [`ToolResult`] handed back to the model alongside the typed error.

use async_trait::async_trait;
use conductor_domain::{ToolCall, ToolKind, ToolResult};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool {0} not found")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("function {0} is not permitted for this tool")]
    FunctionNotPermitted(String),

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("tool call cancelled")]
    Cancelled,

    /// Raised by the `terminate` builtin to end the calling loop.
    #[error("terminate requested")]
    Terminate { response: String },
}

impl ToolError {
    pub fn is_terminate(&self) -> bool {
        matches!(self, ToolError::Terminate { .. })
    }
}

/// A tool call that did not succeed.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct ToolFailure {
    /// Result reported to the model for this call.
    pub result: ToolResult,
    #[source]
    pub error: ToolError,
}

impl ToolFailure {
    /// Failure whose result carries the error's own message.
    pub fn new(call: &ToolCall, error: ToolError) -> Self {
        Self {
            result: ToolResult::failure(call.id.clone(), call.name.clone(), error.to_string()),
            error,
        }
    }

    pub fn with_result(result: ToolResult, error: ToolError) -> Self {
        Self { result, error }
    }
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure>;

    fn kind(&self) -> ToolKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_result_carries_error_text() {
        let call = ToolCall::new("c1", "weather", "{}");
        let failure = ToolFailure::new(&call, ToolError::NotFound("weather".to_string()));
        assert_eq!(failure.result.text(), "tool weather not found");
        assert_eq!(failure.result.id, "c1");
        assert_eq!(failure.to_string(), "tool weather not found");
    }
}
