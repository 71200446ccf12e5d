//! Parallel executor
//!
//! Runs every resolved target concurrently under one shared scope and
//! memory handle. A failing or panicking target becomes an error response
//! and never cancels its siblings. Targets that produce no payload are
//! dropped from the result.

use crate::ports::event_stream::EventStream;
use crate::ports::memory::Memory;
use crate::use_cases::dispatch::{DispatchError, TargetDispatcher, TargetOutcome};
use crate::use_cases::shared::{ExecutionScope, panic_message};
use conductor_domain::{Query, Target, TargetResponse, TokenUsage};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Aggregated result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionBatch {
    /// In resolution order.
    pub responses: Vec<TargetResponse>,
    pub usage: TokenUsage,
}

type TargetResult = Result<Result<TargetOutcome, DispatchError>, String>;

pub struct ParallelExecutor {
    dispatcher: Arc<TargetDispatcher>,
}

impl ParallelExecutor {
    pub fn new(dispatcher: Arc<TargetDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn execute(
        &self,
        query: Arc<Query>,
        targets: Vec<Target>,
        memory: Arc<dyn Memory>,
        events: Option<Arc<dyn EventStream>>,
        scope: &ExecutionScope,
    ) -> ExecutionBatch {
        info!(
            "Executing {} target(s) for query {}",
            targets.len(),
            query.key
        );

        let total = targets.len();
        let mut join_set = JoinSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            let dispatcher = Arc::clone(&self.dispatcher);
            let query = Arc::clone(&query);
            let memory = Arc::clone(&memory);
            let events = events.clone();
            let scope = scope.clone();

            join_set.spawn(async move {
                let result: TargetResult = AssertUnwindSafe(
                    dispatcher.dispatch(&query, &target, memory, events, &scope),
                )
                .catch_unwind()
                .await
                .map_err(|payload| panic_message(payload.as_ref()));
                (index, target, result)
            });
        }

        let mut finished = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                Err(e) => warn!("Target task join error: {}", e),
            }
        }
        finished.sort_by_key(|(index, _, _)| *index);

        let mut batch = ExecutionBatch::default();
        for (_, target, result) in finished {
            match result {
                Ok(Ok(outcome)) => {
                    batch.usage.add(&outcome.usage);
                    match outcome.messages {
                        Some(messages) => {
                            debug!("Target {} completed", target);
                            batch.responses.push(TargetResponse::success(target, &messages));
                        }
                        None => debug!("Target {} produced no payload, dropping", target),
                    }
                }
                Ok(Err(e)) => {
                    warn!("Target {} failed: {}", target, e);
                    batch.responses.push(TargetResponse::error(target, e.to_string()));
                }
                Err(panic) => {
                    error!("Target {} panicked: {}", target, panic);
                    batch.responses.push(TargetResponse::error(
                        target,
                        format!("target execution panicked: {}", panic),
                    ));
                }
            }
        }

        batch
    }
}
