//! Executor for tools published by an external tool server.

use super::executors::arguments_object;
use crate::ports::tool_executor::{ToolError, ToolExecutor, ToolFailure};
use crate::ports::tool_server::ToolServerClient;
use async_trait::async_trait;
use conductor_domain::{ToolCall, ToolKind, ToolResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct McpExecutor {
    client: Arc<dyn ToolServerClient>,
    /// Name as published by the server.
    tool_name: String,
}

impl McpExecutor {
    pub fn new(client: Arc<dyn ToolServerClient>, tool_name: impl Into<String>) -> Self {
        Self {
            client,
            tool_name: tool_name.into(),
        }
    }
}

#[async_trait]
impl ToolExecutor for McpExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let arguments = arguments_object(call)?;
        debug!("Calling remote tool {} for {}", self.tool_name, call.name);

        let output = self
            .client
            .call_tool(&self.tool_name, Value::Object(arguments))
            .await
            .map_err(|e| ToolFailure::new(call, ToolError::Execution(e.to_string())))?;

        let rendered = output.render();
        if output.is_error {
            return Err(ToolFailure::new(call, ToolError::Execution(rendered)));
        }
        Ok(ToolResult::success(&call.id, &call.name, rendered))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }
}
