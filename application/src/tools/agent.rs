//! Agent-as-tool delegation.

use super::executors::arguments_object;
use crate::ports::tool_executor::{ToolError, ToolExecutor, ToolFailure};
use async_trait::async_trait;
use conductor_domain::{Message, ToolCall, ToolKind, ToolResult};
use serde_json::Value;
use std::sync::Arc;

/// Runs another agent on behalf of a tool call.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke_agent(
        &self,
        namespace: &str,
        agent: &str,
        input: Message,
    ) -> Result<Vec<Message>, ToolError>;
}

pub struct AgentDelegateExecutor {
    invoker: Arc<dyn AgentInvoker>,
    namespace: String,
    agent: String,
}

impl AgentDelegateExecutor {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        namespace: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            invoker,
            namespace: namespace.into(),
            agent: agent.into(),
        }
    }
}

#[async_trait]
impl ToolExecutor for AgentDelegateExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let arguments = arguments_object(call)?;
        let input = arguments
            .get("input")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ToolFailure::new(
                    call,
                    ToolError::InvalidArguments("input parameter is required".to_string()),
                )
            })?;

        let messages = self
            .invoker
            .invoke_agent(&self.namespace, &self.agent, Message::user(input))
            .await
            .map_err(|e| ToolFailure::new(call, e))?;

        let content = messages
            .last()
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        Ok(ToolResult::success(&call.id, &call.name, content))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl AgentInvoker for Echo {
        async fn invoke_agent(
            &self,
            namespace: &str,
            agent: &str,
            input: Message,
        ) -> Result<Vec<Message>, ToolError> {
            Ok(vec![
                Message::assistant("thinking"),
                Message::assistant(format!("{}/{} says {}", namespace, agent, input.content())),
            ])
        }
    }

    #[tokio::test]
    async fn test_returns_last_message_of_delegate() {
        let executor = AgentDelegateExecutor::new(Arc::new(Echo), "default", "helper");
        let result = executor
            .execute(&ToolCall::new("c1", "ask_helper", r#"{"input":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(result.text(), "default/helper says hello");
    }

    #[tokio::test]
    async fn test_input_is_required() {
        let executor = AgentDelegateExecutor::new(Arc::new(Echo), "default", "helper");
        let failure = executor
            .execute(&ToolCall::new("c1", "ask_helper", r#"{"question":"hello"}"#))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ToolError::InvalidArguments(_)));
    }
}
