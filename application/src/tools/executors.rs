//! Builtin executors and the partial/filter decorators.

use crate::ports::tool_executor::{ToolError, ToolExecutor, ToolFailure};
use async_trait::async_trait;
use conductor_domain::{
    NOOP_TOOL, TERMINATE_TOOL, ToolCall, ToolDefinition, ToolFunction, ToolKind, ToolResult,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

/// Parse a call's arguments into an object, treating an empty string as `{}`.
pub(crate) fn arguments_object(call: &ToolCall) -> Result<Map<String, Value>, ToolFailure> {
    call.parse_arguments()
        .map_err(|e| ToolFailure::new(call, ToolError::InvalidArguments(e.to_string())))
}

pub fn noop_definition() -> ToolDefinition {
    ToolDefinition::new(
        NOOP_TOOL,
        "A no-operation tool that does nothing and returns success",
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "message": {
                "type": "string",
                "description": "Optional message to include in the response"
            }
        }
    }))
}

pub fn terminate_definition() -> ToolDefinition {
    ToolDefinition::new(
        TERMINATE_TOOL,
        "Use this function to provide a final response to the user and then end the current conversation",
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "response": {
                "type": "string",
                "description": "The message to send before ending the conversation"
            }
        },
        "required": ["response"]
    }))
}

/// Echoes its arguments back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

#[async_trait]
impl ToolExecutor for NoopExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let arguments = call
            .parse_arguments()
            .map(Value::Object)
            .unwrap_or_else(|_| json!({}));
        Ok(ToolResult::success(&call.id, &call.name, arguments.to_string()))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
}

/// Ends the calling loop with the `response` argument as the final answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminateExecutor;

#[async_trait]
impl ToolExecutor for TerminateExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let response = call
            .parse_arguments()
            .ok()
            .and_then(|args| args.get("response").and_then(Value::as_str).map(String::from));

        match response {
            Some(response) => Err(ToolFailure::with_result(
                ToolResult::success(&call.id, &call.name, &response),
                ToolError::Terminate { response },
            )),
            None => Err(ToolFailure::new(
                call,
                ToolError::InvalidArguments("no response".to_string()),
            )),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
}

/// Injects fixed parameter values the model never sees.
pub struct PartialExecutor {
    inner: Arc<dyn ToolExecutor>,
    /// Name of the wrapped tool when the partial renames it.
    base_name: String,
    parameters: Vec<ToolFunction>,
}

impl PartialExecutor {
    pub fn new(
        inner: Arc<dyn ToolExecutor>,
        base_name: impl Into<String>,
        parameters: Vec<ToolFunction>,
    ) -> Self {
        Self {
            inner,
            base_name: base_name.into(),
            parameters,
        }
    }
}

#[async_trait]
impl ToolExecutor for PartialExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let mut arguments = arguments_object(call)?;
        for parameter in &self.parameters {
            arguments.insert(parameter.name.clone(), parameter.value.clone());
        }

        let inner_call = ToolCall::new(
            &call.id,
            &self.base_name,
            Value::Object(arguments).to_string(),
        );
        debug!(
            "Partial tool {} -> {} with {} injected parameter(s)",
            call.name,
            self.base_name,
            self.parameters.len()
        );

        // Results are reported under the name the model used.
        match self.inner.execute(&inner_call).await {
            Ok(mut result) => {
                result.name = call.name.clone();
                Ok(result)
            }
            Err(mut failure) => {
                failure.result.name = call.name.clone();
                Err(failure)
            }
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Partial
    }
}

/// Only lets the listed function names through.
pub struct FilteredExecutor {
    inner: Arc<dyn ToolExecutor>,
    allowed: Vec<String>,
}

impl FilteredExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>, functions: &[ToolFunction]) -> Self {
        Self {
            inner,
            allowed: functions.iter().map(|f| f.name.clone()).collect(),
        }
    }
}

#[async_trait]
impl ToolExecutor for FilteredExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        if !self.allowed.iter().any(|name| *name == call.name) {
            return Err(ToolFailure::new(
                call,
                ToolError::FunctionNotPermitted(call.name.clone()),
            ));
        }
        self.inner.execute(call).await
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Filtered
    }
}
