//! Team runner
//!
//! Sequential strategy: members run in declaration order on the same
//! current message, each seeing the messages produced by the members
//! before it. The team's output is the concatenation of member outputs.

use crate::ports::event_stream::ChunkSink;
use crate::use_cases::agent_runner::{AgentRunner, RunOutput};
use crate::use_cases::dispatch::DispatchError;
use crate::use_cases::shared::ExecutionScope;
use conductor_domain::{Message, Team, TeamStrategy};
use tracing::{debug, info};

#[derive(Clone)]
pub struct TeamRunner {
    agents: AgentRunner,
}

impl TeamRunner {
    pub fn new(agents: AgentRunner) -> Self {
        Self { agents }
    }

    /// Returns `Ok(None)` when every member was executed externally.
    pub async fn run(
        &self,
        team: &Team,
        current: &Message,
        history: &[Message],
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<Option<RunOutput>, DispatchError> {
        if team.members.is_empty() {
            return Err(DispatchError::EmptyTeam(team.meta.name.clone()));
        }

        match team.strategy {
            TeamStrategy::Sequential => self.run_sequential(team, current, history, sink, scope).await,
        }
    }

    async fn run_sequential(
        &self,
        team: &Team,
        current: &Message,
        history: &[Message],
        sink: Option<&dyn ChunkSink>,
        scope: &ExecutionScope,
    ) -> Result<Option<RunOutput>, DispatchError> {
        info!(
            "Running team {}/{} with {} member(s)",
            team.meta.namespace,
            team.meta.name,
            team.members.len()
        );

        let store = &self.agents.services().store;
        let mut context = history.to_vec();
        let mut output: Option<RunOutput> = None;

        for member in &team.members {
            scope.check()?;
            let agent = scope
                .run(store.get_agent(&team.meta.namespace, member))
                .await?;
            debug!("Team {} handing over to {}", team.meta.name, member);

            if let Some(produced) = self.agents.run(&agent, current, &context, sink, scope).await? {
                context.extend_from_slice(&produced.messages);
                let total = output.get_or_insert_with(RunOutput::default);
                total.messages.extend(produced.messages);
                total.usage.add(&produced.usage);
            }
        }

        Ok(output)
    }
}
