//! Tool Registry
//!
//! The [`ToolRegistry`] maps exposed tool names to a definition and an
//! executor. Registering a name twice replaces the earlier entry in place,
//! so the definition list keeps its first-registration order.
//!
//! A registry owns the connection pool its tool-server executors were
//! built from and closes it in [`ToolRegistry::close`].

use super::pool::ConnectionPool;
use crate::ports::telemetry::{NoopTelemetry, Telemetry};
use crate::ports::tool_executor::{ToolError, ToolExecutor, ToolFailure};
use crate::ports::tool_server::ConnectionError;
use conductor_domain::{ToolCall, ToolDefinition, ToolKind, ToolResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct Entry {
    definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
}

pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    pool: Option<Arc<ConnectionPool>>,
    telemetry: Arc<dyn Telemetry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            pool: None,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Register a tool; the last registration for a name wins.
    pub fn register(&mut self, definition: ToolDefinition, executor: Arc<dyn ToolExecutor>) {
        let entry = Entry {
            definition,
            executor,
        };
        match self.index.get(&entry.definition.name) {
            Some(&slot) => {
                debug!("Replacing tool registration {}", entry.definition.name);
                self.entries[slot] = entry;
            }
            None => {
                self.index
                    .insert(entry.definition.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.entries[i].definition)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.definition.clone()).collect()
    }

    pub fn kind_of(&self, name: &str) -> ToolKind {
        self.index
            .get(name)
            .map(|&i| self.entries[i].executor.kind())
            .unwrap_or(ToolKind::Unknown)
    }

    /// Definitions in the OpenAI `tools` request shape.
    pub fn to_openai_tools(&self) -> Vec<serde_json::Value> {
        self.entries
            .iter()
            .map(|e| e.definition.to_openai_tool())
            .collect()
    }

    /// Execute a call by its exposed name.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let Some(&slot) = self.index.get(&call.name) else {
            warn!("Tool {} not found in registry", call.name);
            let failure = ToolFailure::new(call, ToolError::NotFound(call.name.clone()));
            self.telemetry
                .tool_failed(&call.name, &call.id, &failure.error.to_string());
            return Err(failure);
        };

        let executor = &self.entries[slot].executor;
        self.telemetry.tool_started(&call.name, executor.kind(), &call.id);

        let outcome = executor.execute(call).await;
        match &outcome {
            Ok(_) => self.telemetry.tool_succeeded(&call.name, &call.id),
            Err(failure) if failure.error.is_terminate() => {
                self.telemetry.tool_succeeded(&call.name, &call.id)
            }
            Err(failure) => {
                self.telemetry
                    .tool_failed(&call.name, &call.id, &failure.error.to_string())
            }
        }
        outcome
    }

    /// Close the owned connection pool, if any.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        match &self.pool {
            Some(pool) => pool.close().await,
            None => Ok(()),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::executors::{NoopExecutor, TerminateExecutor, noop_definition};
    use async_trait::async_trait;
    use conductor_domain::{NOOP_TOOL, TERMINATE_TOOL};

    struct Fixed(&'static str);

    #[async_trait]
    impl ToolExecutor for Fixed {
        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
            Ok(ToolResult::success(&call.id, &call.name, self.0))
        }

        fn kind(&self) -> ToolKind {
            ToolKind::Http
        }
    }

    struct Broken;

    #[async_trait]
    impl ToolExecutor for Broken {
        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
            Err(ToolFailure::new(call, ToolError::Execution("boom".to_string())))
        }

        fn kind(&self) -> ToolKind {
            ToolKind::Http
        }
    }

    #[tokio::test]
    async fn test_last_registration_wins_and_keeps_order() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("lookup", "first"), Arc::new(Fixed("one")));
        registry.register(noop_definition(), Arc::new(NoopExecutor));
        registry.register(ToolDefinition::new("lookup", "second"), Arc::new(Fixed("two")));

        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["lookup", NOOP_TOOL]);
        assert_eq!(registry.definition("lookup").unwrap().description, "second");

        let result = registry
            .execute(&ToolCall::new("c1", "lookup", "{}"))
            .await
            .unwrap();
        assert_eq!(result.text(), "two");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let failure = registry
            .execute(&ToolCall::new("c1", "missing", "{}"))
            .await
            .unwrap_err();

        assert_eq!(failure.error, ToolError::NotFound("missing".to_string()));
        assert!(failure.result.is_error());
        assert_eq!(failure.result.id, "c1");
    }

    #[tokio::test]
    async fn test_failed_call_leaves_registry_usable() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("broken", "fails"), Arc::new(Broken));
        registry.register(ToolDefinition::new("ok", "works"), Arc::new(Fixed("fine")));

        assert!(registry.execute(&ToolCall::new("c1", "broken", "{}")).await.is_err());
        let result = registry.execute(&ToolCall::new("c2", "ok", "{}")).await.unwrap();
        assert_eq!(result.text(), "fine");
    }

    #[test]
    fn test_kind_classification_and_openai_shape() {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolDefinition::new(TERMINATE_TOOL, "stop"),
            Arc::new(TerminateExecutor),
        );
        registry.register(ToolDefinition::new("lookup", "http"), Arc::new(Fixed("x")));

        assert_eq!(registry.kind_of(TERMINATE_TOOL), ToolKind::Builtin);
        assert_eq!(registry.kind_of("lookup"), ToolKind::Http);
        assert_eq!(registry.kind_of("missing"), ToolKind::Unknown);

        let tools = registry.to_openai_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1]["function"]["name"], "lookup");
    }

    #[tokio::test]
    async fn test_close_without_pool_is_ok() {
        assert!(ToolRegistry::new().close().await.is_ok());
    }
}
