//! Query orchestrator
//!
//! Drives one query through `Unstarted -> Pending -> Running -> {Done,
//! Error, Canceled}`. Each call to [`QueryOrchestrator::reconcile`] performs
//! at most one step and reports whether the caller should come back.
//! Entering Running spawns exactly one background execution, tracked in the
//! [`InFlightRegistry`] until it finishes, panics or is cancelled.

use crate::ports::event_stream::{EventStream, EventStreamFactory, SinkError};
use crate::ports::memory::{MemoryError, MemoryFactory};
use crate::ports::resource_store::{ResourceStore, StoreError};
use crate::ports::telemetry::Telemetry;
use crate::use_cases::dispatch::TargetDispatcher;
use crate::use_cases::execute_targets::ParallelExecutor;
use crate::use_cases::in_flight::{InFlightGuard, InFlightRegistry};
use crate::use_cases::resolve_targets::{ResolveError, TargetResolver};
use crate::use_cases::shared::{ExecutionScope, ExecutionServices, panic_message};
use chrono::Utc;
use conductor_domain::{Chunk, Query, QueryKey, QueryPhase, QueryStatus};
use futures::FutureExt;
use serde_json::json;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors that end a query before any target runs.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("target resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("query cancelled")]
    Cancelled,
}

impl From<MemoryError> for QueryError {
    fn from(err: MemoryError) -> Self {
        QueryError::Setup(format!("memory: {}", err))
    }
}

impl From<SinkError> for QueryError {
    fn from(err: SinkError) -> Self {
        QueryError::Setup(format!("event stream: {}", err))
    }
}

/// What one reconcile step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The query no longer exists.
    Gone,
    /// The query outlived its TTL and was deleted.
    Expired,
    /// Unstarted query moved to Pending.
    Admitted,
    /// Pending query moved to Running.
    MarkedRunning,
    /// A background execution was started.
    Started,
    /// An execution is already in flight; nothing was done.
    AlreadyRunning,
    /// The query was cancelled.
    Canceled,
    /// The query is in a terminal phase.
    Finished(QueryPhase),
}

impl ReconcileAction {
    /// Whether the caller should reconcile again.
    pub fn requeue(&self) -> bool {
        matches!(
            self,
            ReconcileAction::Admitted | ReconcileAction::MarkedRunning
        )
    }
}

struct Inner {
    store: Arc<dyn ResourceStore>,
    memories: Arc<dyn MemoryFactory>,
    events: Option<Arc<dyn EventStreamFactory>>,
    resolver: TargetResolver,
    executor: ParallelExecutor,
    telemetry: Arc<dyn Telemetry>,
    in_flight: Arc<InFlightRegistry>,
}

#[derive(Clone)]
pub struct QueryOrchestrator {
    inner: Arc<Inner>,
}

impl QueryOrchestrator {
    pub fn new(services: ExecutionServices, memories: Arc<dyn MemoryFactory>) -> Self {
        let store = Arc::clone(&services.store);
        let telemetry = Arc::clone(&services.telemetry);
        let dispatcher = Arc::new(TargetDispatcher::new(services));

        Self {
            inner: Arc::new(Inner {
                resolver: TargetResolver::new(Arc::clone(&store)),
                executor: ParallelExecutor::new(dispatcher),
                store,
                memories,
                events: None,
                telemetry,
                in_flight: Arc::new(InFlightRegistry::new()),
            }),
        }
    }

    /// Attach an event stream factory used by streaming queries.
    ///
    /// Must be called before the orchestrator is cloned.
    pub fn with_event_streams(mut self, events: Arc<dyn EventStreamFactory>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.events = Some(events),
            None => warn!("Orchestrator already shared, event streams not attached"),
        }
        self
    }

    pub fn in_flight(&self) -> &Arc<InFlightRegistry> {
        &self.inner.in_flight
    }

    pub fn is_running(&self, key: &QueryKey) -> bool {
        self.inner.in_flight.contains(key)
    }

    /// Perform one reconciliation step for `key`.
    pub async fn reconcile(&self, key: &QueryKey) -> Result<ReconcileAction, QueryError> {
        let Some(query) = self.inner.store.get_query(key).await? else {
            // Vanished objects get no new work.
            self.inner.in_flight.cancel(key);
            return Ok(ReconcileAction::Gone);
        };

        if query.is_expired(Utc::now()) {
            info!("Query {} expired, deleting", key);
            self.delete(key).await?;
            return Ok(ReconcileAction::Expired);
        }

        let phase = query.status.phase;
        if query.cancel && phase != QueryPhase::Canceled {
            return self.cancel(&query).await;
        }

        match phase {
            QueryPhase::Unstarted => {
                self.set_phase(&query, QueryPhase::Pending).await?;
                Ok(ReconcileAction::Admitted)
            }
            QueryPhase::Pending => {
                self.set_phase(&query, QueryPhase::Running).await?;
                Ok(ReconcileAction::MarkedRunning)
            }
            QueryPhase::Running => Ok(self.start(query)),
            terminal => Ok(ReconcileAction::Finished(terminal)),
        }
    }

    /// Cancel the in-flight execution for `key` before it is removed.
    pub fn on_deleted(&self, key: &QueryKey) {
        if self.inner.in_flight.cancel(key) {
            info!("Query {} deleted while running, execution cancelled", key);
        }
    }

    /// Cancel any execution for `key`, then delete it from the store.
    pub async fn delete(&self, key: &QueryKey) -> Result<(), QueryError> {
        self.on_deleted(key);
        self.inner.store.delete_query(key).await?;
        Ok(())
    }

    /// Wait until no execution for `key` is in flight.
    pub async fn wait(&self, key: &QueryKey) {
        self.inner.in_flight.wait_released(key).await;
    }

    async fn cancel(&self, query: &Query) -> Result<ReconcileAction, QueryError> {
        let key = &query.key;
        if self.inner.in_flight.cancel(key) {
            info!("Cancelled running execution of query {}", key);
        }

        let phase = query.status.phase;
        if phase.is_terminal() {
            debug!("Cancel requested for finished query {} ({})", key, phase);
            return Ok(ReconcileAction::Finished(phase));
        }

        self.set_phase(query, QueryPhase::Canceled).await?;
        info!("Query {} canceled", key);
        Ok(ReconcileAction::Canceled)
    }

    async fn set_phase(&self, query: &Query, next: QueryPhase) -> Result<(), QueryError> {
        let phase = query
            .status
            .phase
            .transition(next)
            .map_err(|e| QueryError::Setup(e.to_string()))?;
        let status = QueryStatus {
            phase,
            ..query.status.clone()
        };
        debug!("Query {}: {} -> {}", query.key, query.status.phase, phase);
        self.inner
            .store
            .update_query_status(&query.key, status)
            .await?;
        Ok(())
    }

    fn start(&self, query: Query) -> ReconcileAction {
        let Some(guard) = self.inner.in_flight.try_insert(&query.key) else {
            debug!("Query {} already has an execution in flight", query.key);
            return ReconcileAction::AlreadyRunning;
        };

        info!("Starting execution of query {}", query.key);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let key = query.key.clone();
            let outcome = AssertUnwindSafe(inner.execute(query, &guard))
                .catch_unwind()
                .await;
            if let Err(payload) = outcome {
                let reason = panic_message(payload.as_ref());
                error!("Execution of query {} panicked: {}", key, reason);
                inner
                    .write_terminal(
                        &key,
                        guard.generation(),
                        error_status(format!("execution panicked: {}", reason)),
                    )
                    .await;
            }
            drop(guard);
        });

        ReconcileAction::Started
    }
}

impl Inner {
    async fn execute(&self, query: Query, guard: &InFlightGuard) {
        let started = Instant::now();
        let key = query.key.clone();
        let generation = guard.generation();

        match self.run(query, guard.token(), generation, started).await {
            Ok(phase) => {
                self.telemetry.query_finished(&key, phase, started.elapsed());
            }
            Err(QueryError::Cancelled) => {
                info!("Execution of query {} stopped after cancellation", key);
                self.telemetry
                    .query_finished(&key, QueryPhase::Canceled, started.elapsed());
            }
            Err(e) => {
                warn!("Query {} failed: {}", key, e);
                let mut status = error_status(e.to_string());
                status.duration_ms = Some(elapsed_ms(started));
                self.write_terminal(&key, generation, status).await;
                self.telemetry
                    .query_finished(&key, QueryPhase::Error, started.elapsed());
            }
        }
    }

    async fn run(
        &self,
        query: Query,
        token: &CancellationToken,
        generation: u64,
        started: Instant,
    ) -> Result<QueryPhase, QueryError> {
        let memory = guarded(token, self.memories.for_query(&query)).await??;
        let mut status = query.status.clone();
        if let Some(conversation_id) = memory.conversation_id() {
            status.conversation_id = Some(conversation_id);
        }

        let events = match (&self.events, query.streaming) {
            (Some(factory), true) => Some(guarded(token, factory.create(&query)).await??),
            _ => None,
        };

        let targets = match guarded(token, self.resolver.resolve(&query)).await? {
            Ok(targets) => targets,
            Err(e) => {
                let err = QueryError::from(e);
                if let Some(events) = &events {
                    let mut failed = error_status(err.to_string());
                    failed.conversation_id = status.conversation_id.clone();
                    finalize_events(&query, events.as_ref(), &failed).await;
                }
                return Err(err);
            }
        };
        self.telemetry.query_started(&query.key, targets.len());

        let query = Arc::new(query);
        let scope = ExecutionScope::new(token.clone());
        let batch = self
            .executor
            .execute(
                Arc::clone(&query),
                targets,
                memory,
                events.clone(),
                &scope,
            )
            .await;

        if token.is_cancelled() {
            if let Some(events) = &events {
                let canceled = QueryStatus {
                    phase: QueryPhase::Canceled,
                    ..status
                };
                finalize_events(&query, events.as_ref(), &canceled).await;
            }
            return Err(QueryError::Cancelled);
        }

        let (phase, message) = QueryStatus::outcome(&batch.responses);
        status.phase = phase;
        status.responses = batch.responses;
        status.token_usage = batch.usage;
        status.message = message;
        status.duration_ms = Some(elapsed_ms(started));

        info!(
            "Query {} finished: {} ({} response(s))",
            query.key,
            phase,
            status.responses.len()
        );
        self.write_terminal(&query.key, generation, status.clone()).await;
        if let Some(events) = &events {
            finalize_events(&query, events.as_ref(), &status).await;
        }
        Ok(phase)
    }

    /// Write a terminal status unless the query vanished, was cancelled or
    /// already finished in the meantime.
    ///
    /// `generation` identifies the execution doing the write. Once it is no
    /// longer the registered one (deleted, cancelled or superseded by a run
    /// of a recreated query) the write is dropped.
    async fn write_terminal(&self, key: &QueryKey, generation: u64, status: QueryStatus) {
        if !self.in_flight.is_current(key, generation) {
            debug!("Dropping status of superseded execution of query {}", key);
            return;
        }
        let current = match self.store.get_query(key).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                debug!("Query {} deleted before its status was written", key);
                return;
            }
            Err(e) => {
                error!("Failed to re-read query {}: {}", key, e);
                return;
            }
        };
        if current.cancel || current.status.phase.is_terminal() {
            debug!(
                "Not overwriting status of query {} ({})",
                key, current.status.phase
            );
            return;
        }

        if let Err(e) = self.store.update_query_status(key, status).await {
            error!("Failed to write status of query {}: {}", key, e);
        }
    }
}

/// Run a setup step unless the query is cancelled first.
async fn guarded<F: Future>(token: &CancellationToken, fut: F) -> Result<F::Output, QueryError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(QueryError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Terminal chunk, completion notification, close. Failures are only logged.
async fn finalize_events(query: &Query, events: &dyn EventStream, status: &QueryStatus) {
    let final_chunk = Chunk::content("chatcmpl-final", &query.key.name, "").with_metadata(json!({
        "query": query.key.to_string(),
        "session": query.effective_session_id(),
        "status": serde_json::to_value(status).unwrap_or_default(),
    }));

    if let Err(e) = events.on_chunk(&final_chunk).await {
        warn!("Failed to send final chunk for query {}: {}", query.key, e);
    }
    if let Err(e) = events.notify_completion().await {
        warn!("Failed to notify completion for query {}: {}", query.key, e);
    }
    if let Err(e) = events.close().await {
        warn!("Failed to close event stream for query {}: {}", query.key, e);
    }
}

fn error_status(message: String) -> QueryStatus {
    QueryStatus {
        phase: QueryPhase::Error,
        message: Some(message),
        ..QueryStatus::default()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
