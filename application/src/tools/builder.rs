//! Turns an agent's tool references into a populated [`ToolRegistry`].
//!
//! For each reference: load the canonical definition, override the
//! description, apply the partial transform, then the function filter.

use super::agent::{AgentDelegateExecutor, AgentInvoker};
use super::executors::{
    FilteredExecutor, NoopExecutor, PartialExecutor, TerminateExecutor, noop_definition,
    terminate_definition,
};
use super::mcp::McpExecutor;
use super::pool::ConnectionPool;
use super::registry::ToolRegistry;
use crate::ports::resource_store::{ResourceStore, StoreError};
use crate::ports::telemetry::{NoopTelemetry, Telemetry};
use crate::ports::tool_executor::ToolExecutor;
use crate::ports::tool_server::{ConnectionError, ToolBackends};
use conductor_domain::{
    AgentToolKind, AgentToolRef, DomainError, NOOP_TOOL, TERMINATE_TOOL, ToolDefinition,
    ToolResource, ToolServerSettings, ToolSpec,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ToolBuildError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tool server connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transform(#[from] DomainError),

    #[error("unknown builtin tool: {0}")]
    UnknownBuiltin(String),

    #[error("tool {tool} delegates to agent {agent}, but agent tools are unavailable here")]
    AgentToolsUnavailable { tool: String, agent: String },
}

pub struct ToolRegistryBuilder {
    store: Arc<dyn ResourceStore>,
    backends: Arc<dyn ToolBackends>,
    pool: Arc<ConnectionPool>,
    invoker: Option<Arc<dyn AgentInvoker>>,
    telemetry: Arc<dyn Telemetry>,
}

impl ToolRegistryBuilder {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        backends: Arc<dyn ToolBackends>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            store,
            backends,
            pool,
            invoker: None,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn AgentInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Build a registry for `refs`, resolving custom tools in `namespace`.
    ///
    /// The returned registry owns the builder's pool. On error the pool is
    /// left open for the caller to close.
    pub async fn build(
        &self,
        namespace: &str,
        refs: &[AgentToolRef],
        tool_servers: &BTreeMap<String, ToolServerSettings>,
    ) -> Result<ToolRegistry, ToolBuildError> {
        let mut registry = ToolRegistry::new()
            .with_pool(Arc::clone(&self.pool))
            .with_telemetry(Arc::clone(&self.telemetry));

        for tool_ref in refs {
            let (definition, executor) = match tool_ref.kind {
                AgentToolKind::Builtin => builtin(&tool_ref.name)?,
                AgentToolKind::Custom => {
                    let resource = self.store.get_tool(namespace, &tool_ref.name).await?;
                    let executor = self.executor_for(&resource, tool_servers).await?;
                    (resource.definition(), executor)
                }
            };
            let (definition, executor) = decorate(definition, executor, tool_ref)?;

            debug!(
                "Registered tool {} ({}) for namespace {}",
                definition.name,
                executor.kind(),
                namespace
            );
            registry.register(definition, executor);
        }

        Ok(registry)
    }

    async fn executor_for(
        &self,
        resource: &ToolResource,
        tool_servers: &BTreeMap<String, ToolServerSettings>,
    ) -> Result<Arc<dyn ToolExecutor>, ToolBuildError> {
        match &resource.spec {
            ToolSpec::Http(spec) => Ok(self.backends.http_executor(resource, spec)),
            ToolSpec::Mcp(spec) => {
                let server_namespace = spec
                    .server_namespace
                    .as_deref()
                    .unwrap_or(&resource.meta.namespace);
                let server = self
                    .store
                    .get_tool_server(server_namespace, &spec.server)
                    .await?;
                let settings = tool_servers
                    .get(&format!("{}/{}", server_namespace, spec.server))
                    .or_else(|| tool_servers.get(&spec.server));

                let client = self.pool.get_or_create(&server, settings).await?;
                Ok(Arc::new(McpExecutor::new(client, &spec.tool_name)))
            }
            ToolSpec::Agent { agent } => match &self.invoker {
                Some(invoker) => Ok(Arc::new(AgentDelegateExecutor::new(
                    Arc::clone(invoker),
                    &resource.meta.namespace,
                    agent,
                ))),
                None => Err(ToolBuildError::AgentToolsUnavailable {
                    tool: resource.meta.name.clone(),
                    agent: agent.clone(),
                }),
            },
            ToolSpec::Builtin => builtin(&resource.meta.name).map(|(_, executor)| executor),
        }
    }
}

fn builtin(name: &str) -> Result<(ToolDefinition, Arc<dyn ToolExecutor>), ToolBuildError> {
    match name {
        NOOP_TOOL => Ok((noop_definition(), Arc::new(NoopExecutor) as Arc<dyn ToolExecutor>)),
        TERMINATE_TOOL => Ok((terminate_definition(), Arc::new(TerminateExecutor) as _)),
        other => Err(ToolBuildError::UnknownBuiltin(other.to_string())),
    }
}

/// Description override, then partial, then filter.
fn decorate(
    mut definition: ToolDefinition,
    mut executor: Arc<dyn ToolExecutor>,
    tool_ref: &AgentToolRef,
) -> Result<(ToolDefinition, Arc<dyn ToolExecutor>), ToolBuildError> {
    if let Some(description) = tool_ref.description.as_deref().filter(|d| !d.is_empty()) {
        definition = definition.with_description(description);
    }

    if let Some(partial) = &tool_ref.partial {
        let derived = definition.apply_partial(partial)?;
        executor = Arc::new(PartialExecutor::new(
            executor,
            &definition.name,
            partial.parameters.clone(),
        ));
        definition = derived;
    }

    if !tool_ref.functions.is_empty() {
        executor = Arc::new(FilteredExecutor::new(executor, &tool_ref.functions));
    }

    Ok((definition, executor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::ports::tool_executor::ToolFailure;
    use crate::ports::tool_server::{
        CallContent, CallToolOutput, ConnectRequest, RemoteTool, ToolServerClient,
        ToolServerConnector,
    };
    use async_trait::async_trait;
    use conductor_domain::{
        Agent, HttpToolSpec, LabelSelector, McpToolSpec, MemoryResource, ModelResource,
        ObjectMeta, Query, QueryKey, QueryStatus, Team, ToolCall, ToolFunction, ToolKind,
        ToolPartial, ToolResult, ToolServer, ToolServerTransport,
    };
    use serde_json::{Value, json};
    use std::sync::Mutex;

    // -- Mocks -----------------------------------------------------------------

    #[derive(Default)]
    struct ToolStore {
        tools: Vec<ToolResource>,
        servers: Vec<ToolServer>,
    }

    #[async_trait]
    impl ResourceStore for ToolStore {
        async fn get_query(&self, _key: &QueryKey) -> Result<Option<Query>, StoreError> {
            Ok(None)
        }
        async fn put_query(&self, _query: Query) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete_query(&self, _key: &QueryKey) -> Result<(), StoreError> {
            Ok(())
        }
        async fn update_query_status(
            &self,
            _key: &QueryKey,
            _status: QueryStatus,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_agent(&self, ns: &str, name: &str) -> Result<Agent, StoreError> {
            Err(StoreError::not_found("agent", ns, name))
        }
        async fn list_agents(
            &self,
            _ns: &str,
            _selector: Option<&LabelSelector>,
        ) -> Result<Vec<Agent>, StoreError> {
            Ok(vec![])
        }
        async fn get_team(&self, ns: &str, name: &str) -> Result<Team, StoreError> {
            Err(StoreError::not_found("team", ns, name))
        }
        async fn list_teams(
            &self,
            _ns: &str,
            _selector: Option<&LabelSelector>,
        ) -> Result<Vec<Team>, StoreError> {
            Ok(vec![])
        }
        async fn get_model(&self, ns: &str, name: &str) -> Result<ModelResource, StoreError> {
            Err(StoreError::not_found("model", ns, name))
        }
        async fn list_models(
            &self,
            _ns: &str,
            _selector: Option<&LabelSelector>,
        ) -> Result<Vec<ModelResource>, StoreError> {
            Ok(vec![])
        }
        async fn get_tool(&self, ns: &str, name: &str) -> Result<ToolResource, StoreError> {
            self.tools
                .iter()
                .find(|t| t.meta.namespace == ns && t.meta.name == name)
                .cloned()
                .ok_or_else(|| StoreError::not_found("tool", ns, name))
        }
        async fn list_tools(
            &self,
            _ns: &str,
            _selector: Option<&LabelSelector>,
        ) -> Result<Vec<ToolResource>, StoreError> {
            Ok(self.tools.clone())
        }
        async fn get_tool_server(&self, ns: &str, name: &str) -> Result<ToolServer, StoreError> {
            self.servers
                .iter()
                .find(|s| s.meta.namespace == ns && s.meta.name == name)
                .cloned()
                .ok_or_else(|| StoreError::not_found("tool server", ns, name))
        }
        async fn get_memory(&self, ns: &str, name: &str) -> Result<MemoryResource, StoreError> {
            Err(StoreError::not_found("memory", ns, name))
        }
    }

    /// HTTP executor stand-in that echoes the arguments it receives.
    struct EchoHttp;

    #[async_trait]
    impl ToolExecutor for EchoHttp {
        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
            Ok(ToolResult::success(&call.id, &call.name, &call.arguments))
        }

        fn kind(&self) -> ToolKind {
            ToolKind::Http
        }
    }

    struct EchoClient;

    #[async_trait]
    impl ToolServerClient for EchoClient {
        async fn list_tools(&self) -> Result<Vec<RemoteTool>, ConnectionError> {
            Ok(vec![])
        }
        async fn call_tool(
            &self,
            name: &str,
            arguments: Value,
        ) -> Result<CallToolOutput, ConnectionError> {
            Ok(CallToolOutput {
                content: vec![CallContent::Text(format!("{} {}", name, arguments))],
                is_error: false,
            })
        }
        async fn close(&self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Backends {
        connects: Mutex<Vec<ConnectRequest>>,
    }

    #[async_trait]
    impl ToolServerConnector for Backends {
        async fn connect(
            &self,
            request: &ConnectRequest,
        ) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
            self.connects.lock().unwrap().push(request.clone());
            Ok(Arc::new(EchoClient))
        }
    }

    struct BackendsHandle(Arc<Backends>);

    impl ToolBackends for BackendsHandle {
        fn http_executor(
            &self,
            _tool: &ToolResource,
            _spec: &HttpToolSpec,
        ) -> Arc<dyn ToolExecutor> {
            Arc::new(EchoHttp)
        }

        fn connector(&self) -> Arc<dyn ToolServerConnector> {
            self.0.clone()
        }
    }

    // -- Helpers ---------------------------------------------------------------

    fn weather_tool() -> ToolResource {
        ToolResource {
            meta: ObjectMeta::new("default", "weather"),
            description: "Current weather".to_string(),
            input_schema: Some(json!({
                "type": "object",
                "properties": {"city": {"type": "string"}, "units": {"type": "string"}},
                "required": ["city", "units"]
            })),
            spec: ToolSpec::Http(HttpToolSpec {
                url: "https://weather.example.com/{city}".to_string(),
                method: "GET".to_string(),
                headers: BTreeMap::new(),
                body: None,
                timeout_secs: None,
            }),
        }
    }

    fn github_tools() -> (Vec<ToolResource>, Vec<ToolServer>) {
        let tool = |name: &str| ToolResource {
            meta: ObjectMeta::new("default", name),
            description: String::new(),
            input_schema: None,
            spec: ToolSpec::Mcp(McpToolSpec {
                server: "github".to_string(),
                server_namespace: None,
                tool_name: name.to_string(),
            }),
        };
        let server = ToolServer {
            meta: ObjectMeta::new("default", "github"),
            address: "http://github-mcp:8080".to_string(),
            transport: ToolServerTransport::Http,
            headers: BTreeMap::new(),
            timeout_secs: None,
        };
        (vec![tool("search_issues"), tool("list_prs")], vec![server])
    }

    fn builder(store: ToolStore) -> (ToolRegistryBuilder, Arc<Backends>) {
        let backends = Arc::new(Backends::default());
        let handle = Arc::new(BackendsHandle(backends.clone()));
        let pool = Arc::new(ConnectionPool::new(handle.connector(), RetryPolicy::default()));
        (
            ToolRegistryBuilder::new(Arc::new(store), handle, pool),
            backends,
        )
    }

    // -- Tests -----------------------------------------------------------------

    #[tokio::test]
    async fn test_partial_hides_parameter_and_injects_it() {
        let (builder, _) = builder(ToolStore {
            tools: vec![weather_tool()],
            servers: vec![],
        });
        let refs = vec![AgentToolRef {
            partial: Some(ToolPartial {
                name: None,
                parameters: vec![ToolFunction::new("units", "metric")],
            }),
            ..AgentToolRef::custom("weather")
        }];

        let registry = builder.build("default", &refs, &BTreeMap::new()).await.unwrap();

        let definition = registry.definition("weather").unwrap();
        assert!(definition.parameters["properties"].get("units").is_none());
        assert_eq!(definition.parameters["required"], json!(["city"]));
        assert_eq!(registry.kind_of("weather"), ToolKind::Partial);

        let result = registry
            .execute(&ToolCall::new("c1", "weather", r#"{"city":"Oslo"}"#))
            .await
            .unwrap();
        let sent: Value = serde_json::from_str(result.text()).unwrap();
        assert_eq!(sent, json!({"city": "Oslo", "units": "metric"}));
    }

    #[tokio::test]
    async fn test_description_override_and_builtins() {
        let (builder, _) = builder(ToolStore {
            tools: vec![weather_tool()],
            servers: vec![],
        });
        let refs = vec![
            AgentToolRef {
                description: Some("Weather for travel planning".to_string()),
                ..AgentToolRef::custom("weather")
            },
            AgentToolRef::builtin(NOOP_TOOL),
            AgentToolRef::builtin(TERMINATE_TOOL),
        ];

        let registry = builder.build("default", &refs, &BTreeMap::new()).await.unwrap();

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["weather", NOOP_TOOL, TERMINATE_TOOL]);
        assert_eq!(
            registry.definition("weather").unwrap().description,
            "Weather for travel planning"
        );
        assert_eq!(registry.kind_of(NOOP_TOOL), ToolKind::Builtin);
    }

    #[tokio::test]
    async fn test_tools_on_one_server_share_a_client() {
        let (tools, servers) = github_tools();
        let (builder, backends) = builder(ToolStore { tools, servers });
        let settings = BTreeMap::from([(
            "default/github".to_string(),
            ToolServerSettings {
                headers: BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
                tool_calls: vec![],
            },
        )]);
        let refs = vec![
            AgentToolRef::custom("search_issues"),
            AgentToolRef::custom("list_prs"),
        ];

        let registry = builder.build("default", &refs, &settings).await.unwrap();

        let connects = backends.connects.lock().unwrap().clone();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].headers["Authorization"], "Bearer t");
        assert_eq!(registry.kind_of("list_prs"), ToolKind::Mcp);

        let result = registry
            .execute(&ToolCall::new("c1", "search_issues", r#"{"q":"bug"}"#))
            .await
            .unwrap();
        assert_eq!(result.text(), r#"search_issues {"q":"bug"}"#);
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_applies_after_partial() {
        let (tools, servers) = github_tools();
        let (builder, _) = builder(ToolStore { tools, servers });
        let refs = vec![AgentToolRef {
            functions: vec![ToolFunction::new("search_issues", Value::Null)],
            ..AgentToolRef::custom("search_issues")
        }];

        let registry = builder.build("default", &refs, &BTreeMap::new()).await.unwrap();
        assert_eq!(registry.kind_of("search_issues"), ToolKind::Filtered);
        assert!(
            registry
                .execute(&ToolCall::new("c1", "search_issues", "{}"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_missing_tool_and_agent_delegate_without_invoker() {
        let (builder, _) = builder(ToolStore {
            tools: vec![ToolResource {
                meta: ObjectMeta::new("default", "ask_helper"),
                description: String::new(),
                input_schema: None,
                spec: ToolSpec::Agent {
                    agent: "helper".to_string(),
                },
            }],
            servers: vec![],
        });

        let err = builder
            .build("default", &[AgentToolRef::custom("nope")], &BTreeMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolBuildError::Store(ref e) if e.is_not_found()));

        let err = builder
            .build("default", &[AgentToolRef::custom("ask_helper")], &BTreeMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolBuildError::AgentToolsUnavailable { .. }));

        let err = builder
            .build("default", &[AgentToolRef::builtin("sudo")], &BTreeMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolBuildError::UnknownBuiltin(_)));
    }
}
