//! Application layer for conductor
//!
//! This crate contains the query execution use cases, the tool invocation
//! framework, port definitions and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod tools;
pub mod use_cases;

// Re-export commonly used types
pub use config::{ExecutionParams, RetryPolicy};
pub use ports::{
    chat_provider::{ChatProvider, ProviderError, ProviderFactory},
    event_stream::{ChunkSink, EventStream, EventStreamFactory, SinkError, TaggedSink},
    memory::{Memory, MemoryError, MemoryFactory, NoopMemory},
    resource_store::{ResourceStore, StoreError},
    telemetry::{NoopTelemetry, Telemetry},
    tool_executor::{ToolError, ToolExecutor, ToolFailure},
    tool_server::{ConnectionError, ToolBackends, ToolServerClient, ToolServerConnector},
};
pub use tools::{ConnectionPool, ToolRegistry, ToolRegistryBuilder};
pub use use_cases::dispatch::{DispatchError, TargetDispatcher, TargetOutcome};
pub use use_cases::execute_targets::{ExecutionBatch, ParallelExecutor};
pub use use_cases::in_flight::InFlightRegistry;
pub use use_cases::orchestrator::{QueryError, QueryOrchestrator, ReconcileAction};
pub use use_cases::resolve_targets::{ResolveError, TargetResolver};
pub use use_cases::shared::{ExecutionScope, ExecutionServices};
