//! Target dispatcher
//!
//! Routes one resolved target to its execution path. Agent, team and model
//! targets load history from memory, run, and persist input and output
//! back in one append. Tool targets run a single call through a
//! throwaway registry and persist nothing.
//!
//! Every path runs under the query's [`ExecutionScope`], narrowed to the
//! per-target timeout.

use crate::ports::chat_provider::ProviderError;
use crate::ports::event_stream::{ChunkSink, EventStream, TaggedSink};
use crate::ports::memory::{Memory, MemoryError};
use crate::ports::resource_store::StoreError;
use crate::ports::tool_executor::ToolError;
use crate::tools::{ConnectionPool, ToolBuildError, ToolRegistryBuilder};
use crate::use_cases::agent_runner::{AgentRunner, RunOutput};
use crate::use_cases::shared::{
    ExecutionScope, ExecutionServices, messages_for_memory, prepare_execution_messages,
};
use crate::use_cases::team_runner::TeamRunner;
use conductor_domain::{
    AgentToolRef, Message, Query, Target, TargetKind, TokenUsage, ToolCall,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors of a single target execution.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("unable to prepare tools: {0}")]
    Tools(#[from] ToolBuildError),

    #[error("tool execution failed: {0}")]
    Tool(ToolError),

    #[error("query has no input messages")]
    NoInput,

    #[error("model returned no completion choices")]
    NoChoices,

    #[error("agent {agent} did not finish within {turns} turns")]
    TurnLimit { agent: String, turns: usize },

    #[error("team {0} has no members")]
    EmptyTeam(String),

    #[error("target execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("target execution cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled)
    }
}

/// What one target produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetOutcome {
    /// `None` when execution was delegated and produced no payload.
    pub messages: Option<Vec<Message>>,
    pub usage: TokenUsage,
}

impl TargetOutcome {
    fn from_run(output: Option<RunOutput>) -> Self {
        match output {
            Some(output) => Self {
                messages: Some(output.messages),
                usage: output.usage,
            },
            None => Self::default(),
        }
    }

    fn messages(messages: Vec<Message>, usage: TokenUsage) -> Self {
        Self {
            messages: Some(messages),
            usage,
        }
    }
}

pub struct TargetDispatcher {
    services: ExecutionServices,
    agents: AgentRunner,
    teams: TeamRunner,
}

impl TargetDispatcher {
    pub fn new(services: ExecutionServices) -> Self {
        let agents = AgentRunner::new(services.clone());
        let teams = TeamRunner::new(agents.clone());
        Self {
            services,
            agents,
            teams,
        }
    }

    pub fn services(&self) -> &ExecutionServices {
        &self.services
    }

    /// Execute `target` for `query`.
    pub async fn dispatch(
        &self,
        query: &Query,
        target: &Target,
        memory: Arc<dyn Memory>,
        events: Option<Arc<dyn EventStream>>,
        scope: &ExecutionScope,
    ) -> Result<TargetOutcome, DispatchError> {
        let scope = scope.with_timeout(self.services.params.target_timeout(query.timeout));
        let sink = events.map(|events| {
            TaggedSink::new(
                events,
                json!({
                    "query": query.key.to_string(),
                    "session": query.effective_session_id(),
                    "target": target.to_string(),
                }),
            )
        });
        let sink = sink.as_ref().map(|s| s as &dyn ChunkSink);

        self.services.telemetry.target_started(&query.key, target);
        debug!("Dispatching {} for query {}", target, query.key);

        let result = match target.kind {
            TargetKind::Agent => self.run_agent(query, &target.name, memory.as_ref(), sink, &scope).await,
            TargetKind::Team => self.run_team(query, &target.name, memory.as_ref(), sink, &scope).await,
            TargetKind::Model => self.run_model(query, &target.name, memory.as_ref(), sink, &scope).await,
            TargetKind::Tool => self.run_tool(query, &target.name, &scope).await,
        };

        match &result {
            Ok(_) => self.services.telemetry.target_succeeded(&query.key, target),
            Err(e) => {
                self.services
                    .telemetry
                    .target_failed(&query.key, target, &e.to_string())
            }
        }
        result
    }

    async fn run_agent(
        &self,
        query: &Query,
        name: &str,
        memory: &dyn Memory,
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<TargetOutcome, DispatchError> {
        let namespace = &query.key.namespace;
        let agent = scope.run(self.services.store.get_agent(namespace, name)).await?;
        let history = scope.run(memory.get_messages()).await?;
        let (current, context) = prepare_execution_messages(&query.input, history)?;

        let output = self.agents.run(&agent, &current, &context, sink, scope).await?;
        self.persist(query, memory, output.as_ref(), scope).await?;
        Ok(TargetOutcome::from_run(output))
    }

    async fn run_team(
        &self,
        query: &Query,
        name: &str,
        memory: &dyn Memory,
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<TargetOutcome, DispatchError> {
        let namespace = &query.key.namespace;
        let team = scope.run(self.services.store.get_team(namespace, name)).await?;
        let history = scope.run(memory.get_messages()).await?;
        let (current, context) = prepare_execution_messages(&query.input, history)?;

        let output = self.teams.run(&team, &current, &context, sink, scope).await?;
        self.persist(query, memory, output.as_ref(), scope).await?;
        Ok(TargetOutcome::from_run(output))
    }

    /// Direct model call, no tools. Streams when an event stream is attached.
    async fn run_model(
        &self,
        query: &Query,
        name: &str,
        memory: &dyn Memory,
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<TargetOutcome, DispatchError> {
        let namespace = &query.key.namespace;
        let model = scope.run(self.services.store.get_model(namespace, name)).await?;
        let provider = self.services.providers.create(&model)?;

        let mut messages = scope.run(memory.get_messages()).await?;
        if query.input.is_empty() {
            return Err(DispatchError::NoInput);
        }
        messages.extend_from_slice(&query.input);

        let completion = match sink {
            Some(sink) => {
                scope
                    .run(provider.chat_completion_stream(&messages, 1, &[], sink))
                    .await?
            }
            None => scope.run(provider.chat_completion(&messages, 1, &[])).await?,
        };
        self.services
            .telemetry
            .model_completed(provider.model(), &completion.usage);

        let reply = completion.first_message().ok_or(DispatchError::NoChoices)?;
        // The streamed reply keeps its tool calls; the unary one is content only.
        let reply = if sink.is_some() {
            reply.clone()
        } else {
            Message::assistant(reply.content())
        };

        let output = RunOutput {
            messages: vec![reply],
            usage: completion.usage,
        };
        self.persist(query, memory, Some(&output), scope).await?;
        Ok(TargetOutcome::messages(output.messages, output.usage))
    }

    /// One call through a call-scoped registry. Nothing is persisted.
    async fn run_tool(
        &self,
        query: &Query,
        name: &str,
        scope: &ExecutionScope,
    ) -> Result<TargetOutcome, DispatchError> {
        let raw = query
            .input
            .last()
            .map(|m| m.content().to_string())
            .ok_or(DispatchError::NoInput)?;
        let arguments = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => json!({ "input": raw }),
        };
        let call = ToolCall::new(format!("tool-call-{}", name), name, arguments.to_string());

        let pool = Arc::new(ConnectionPool::new(
            self.services.tools.connector(),
            self.services.retry.clone(),
        ));
        let builder = ToolRegistryBuilder::new(
            Arc::clone(&self.services.store),
            Arc::clone(&self.services.tools),
            Arc::clone(&pool),
        )
        .with_invoker(self.agents.invoker(scope))
        .with_telemetry(Arc::clone(&self.services.telemetry));

        let built = scope
            .run(builder.build(
                &query.key.namespace,
                &[AgentToolRef::custom(name)],
                &BTreeMap::new(),
            ))
            .await;
        let registry = match built {
            Ok(registry) => registry,
            Err(e) => {
                if let Err(close_err) = pool.close().await {
                    warn!("Failed to close tool server connections: {}", close_err);
                }
                return Err(e);
            }
        };

        let executed = scope
            .run(async { Ok::<_, DispatchError>(registry.execute(&call).await) })
            .await;
        match registry.close().await {
            Ok(()) => debug!("Tool server connections for {} closed", call.id),
            Err(e) => warn!("Failed to close tool server connections: {}", e),
        }

        let content = match executed? {
            Ok(result) => result.text().to_string(),
            Err(failure) => match failure.error {
                ToolError::Terminate { response } => response,
                ToolError::Cancelled => return Err(DispatchError::Cancelled),
                error => return Err(DispatchError::Tool(error)),
            },
        };
        info!("Tool target {} completed for query {}", name, query.key);
        Ok(TargetOutcome::messages(
            vec![Message::assistant(content)],
            TokenUsage::default(),
        ))
    }

    /// Append input and produced messages in one call.
    async fn persist(
        &self,
        query: &Query,
        memory: &dyn Memory,
        output: Option<&RunOutput>,
        scope: &ExecutionScope,
    ) -> Result<(), DispatchError> {
        // Delegated executions persist on their own.
        let Some(output) = output else {
            return Ok(());
        };
        let messages = messages_for_memory(&query.input, &output.messages);
        scope
            .run(memory.add_messages(&query.key.name, &messages))
            .await
    }
}
