//! Agent runner
//!
//! Runs one agent: system prompt, history and the current message go to
//! the agent's model together with its tool definitions; every tool call
//! the model makes is executed and answered, and the model is called
//! again until it stops calling tools, the builtin `terminate` tool is
//! used, or the turn limit is reached.
//!
//! Each run owns a fresh connection pool through its tool registry and
//! closes it before returning, cancelled or not.

use crate::ports::chat_provider::ChatProvider;
use crate::ports::event_stream::ChunkSink;
use crate::ports::tool_executor::ToolError;
use crate::tools::{AgentInvoker, ConnectionPool, ToolRegistry, ToolRegistryBuilder};
use crate::use_cases::dispatch::DispatchError;
use crate::use_cases::shared::{ExecutionScope, ExecutionServices};
use async_trait::async_trait;
use conductor_domain::{Agent, Message, TokenUsage, ToolDefinition};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Model used by agents that do not name one.
pub const DEFAULT_MODEL: &str = "default";

/// Messages produced by a run, and what they cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub messages: Vec<Message>,
    pub usage: TokenUsage,
}

#[derive(Clone)]
pub struct AgentRunner {
    services: ExecutionServices,
}

impl AgentRunner {
    pub fn new(services: ExecutionServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &ExecutionServices {
        &self.services
    }

    /// Invoker for agent-as-tool delegation bound to `scope`.
    pub fn invoker(&self, scope: &ExecutionScope) -> Arc<dyn AgentInvoker> {
        Arc::new(DelegateInvoker {
            runner: self.clone(),
            scope: scope.clone(),
        })
    }

    /// Run `agent` on `current` with `history` as prior context.
    ///
    /// Returns `Ok(None)` for agents executed by an external engine.
    pub async fn run(
        &self,
        agent: &Agent,
        current: &Message,
        history: &[Message],
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<Option<RunOutput>, DispatchError> {
        if let Some(engine) = &agent.execution_engine {
            info!(
                "Agent {}/{} is executed by engine {}, nothing to run here",
                agent.meta.namespace, agent.meta.name, engine
            );
            return Ok(None);
        }

        let namespace = &agent.meta.namespace;
        let model_name = agent.model_ref.as_deref().unwrap_or(DEFAULT_MODEL);
        let model = scope
            .run(self.services.store.get_model(namespace, model_name))
            .await?;
        let provider = self.services.providers.create(&model)?;

        let pool = Arc::new(ConnectionPool::new(
            self.services.tools.connector(),
            self.services.retry.clone(),
        ));
        let builder = ToolRegistryBuilder::new(
            Arc::clone(&self.services.store),
            Arc::clone(&self.services.tools),
            Arc::clone(&pool),
        )
        .with_invoker(self.invoker(scope))
        .with_telemetry(Arc::clone(&self.services.telemetry));

        let registry = match scope
            .run(builder.build(namespace, &agent.tools, &agent.tool_servers))
            .await
        {
            Ok(registry) => registry,
            Err(e) => {
                if let Err(close_err) = pool.close().await {
                    warn!("Failed to close tool server connections: {}", close_err);
                }
                return Err(e);
            }
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        if !agent.prompt.is_empty() {
            messages.push(Message::system(&agent.prompt));
        }
        messages.extend_from_slice(history);
        messages.push(current.clone());

        let result = self
            .tool_loop(agent, provider.as_ref(), &registry, messages, sink, scope)
            .await;

        if let Err(e) = registry.close().await {
            warn!("Failed to close tool server connections: {}", e);
        }
        result.map(Some)
    }

    async fn tool_loop(
        &self,
        agent: &Agent,
        provider: &dyn ChatProvider,
        registry: &ToolRegistry,
        mut messages: Vec<Message>,
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<RunOutput, DispatchError> {
        let definitions: Vec<ToolDefinition> = registry.definitions();
        let max_turns = self.services.params.max_agent_turns;
        let mut output = RunOutput::default();

        for turn in 1..=max_turns {
            scope.check()?;
            debug!(
                "Agent {} turn {}/{} with {} message(s)",
                agent.meta.name,
                turn,
                max_turns,
                messages.len()
            );

            let completion = match sink {
                Some(sink) => {
                    scope
                        .run(provider.chat_completion_stream(&messages, 1, &definitions, sink))
                        .await?
                }
                None => {
                    scope
                        .run(provider.chat_completion(&messages, 1, &definitions))
                        .await?
                }
            };
            self.services
                .telemetry
                .model_completed(provider.model(), &completion.usage);
            output.usage.add(&completion.usage);

            let reply = completion
                .first_message()
                .cloned()
                .ok_or(DispatchError::NoChoices)?;
            let tool_calls = reply.tool_calls().to_vec();
            messages.push(reply.clone());
            output.messages.push(reply);

            if tool_calls.is_empty() {
                return Ok(output);
            }

            for call in &tool_calls {
                let executed = scope
                    .run(async { Ok::<_, DispatchError>(registry.execute(call).await) })
                    .await?;
                let tool_message = match executed {
                    Ok(result) => result.to_message(),
                    Err(failure) => match failure.error {
                        ToolError::Terminate { response } => {
                            info!("Agent {} terminated via {}", agent.meta.name, call.name);
                            output.messages.push(failure.result.to_message());
                            output.messages.push(Message::assistant(response));
                            return Ok(output);
                        }
                        ToolError::Cancelled => return Err(DispatchError::Cancelled),
                        error => {
                            warn!("Tool {} failed for agent {}: {}", call.name, agent.meta.name, error);
                            failure.result.to_message()
                        }
                    },
                };
                messages.push(tool_message.clone());
                output.messages.push(tool_message);
            }
        }

        Err(DispatchError::TurnLimit {
            agent: agent.meta.name.clone(),
            turns: max_turns,
        })
    }
}

/// Runs a peer agent for an agent-backed tool, inside the caller's scope.
struct DelegateInvoker {
    runner: AgentRunner,
    scope: ExecutionScope,
}

#[async_trait]
impl AgentInvoker for DelegateInvoker {
    async fn invoke_agent(
        &self,
        namespace: &str,
        agent: &str,
        input: Message,
    ) -> Result<Vec<Message>, ToolError> {
        let agent = self
            .scope
            .run(self.runner.services.store.get_agent(namespace, agent))
            .await
            .map_err(into_tool_error)?;
        let output = self
            .runner
            .run(&agent, &input, &[], None, &self.scope)
            .await
            .map_err(into_tool_error)?;
        Ok(output.map(|o| o.messages).unwrap_or_default())
    }
}

fn into_tool_error(error: DispatchError) -> ToolError {
    match error {
        DispatchError::Cancelled => ToolError::Cancelled,
        other => ToolError::Execution(other.to_string()),
    }
}
