//! Domain layer for conductor
//!
//! This crate contains the core entities and value objects of the query
//! execution engine. It has no dependencies on infrastructure concerns.
//!
//! # Core Concepts
//!
//! - **Query**: a request naming one or more targets in a namespace
//! - **Target**: an agent, team, model or tool to execute
//! - **Message**: a role-discriminated conversation entry
//! - **Stream assembly**: folding fragmented streaming chunks back into one
//!   completion, tool calls included

pub mod completion;
pub mod core;
pub mod message;
pub mod query;
pub mod resource;
pub mod tool;

// Re-export commonly used types
pub use completion::{
    Assembled, Chunk, ChunkChoice, Choice, Completion, Delta, FinishReason, StreamAssembler,
    TokenUsage, ToolCallDelta,
};
pub use core::error::DomainError;
pub use message::{Message, Role, ToolCall};
pub use query::{
    entities::{
        Query, QueryKey, QueryPhase, QueryStatus, ResponsePhase, Target, TargetKind,
        TargetResponse,
    },
    selector::{LabelSelector, Labels, SelectorOperator, SelectorRequirement},
};
pub use resource::{
    MemoryResource, ObjectMeta,
    agent::{
        Agent, AgentToolKind, AgentToolRef, StartupToolCall, Team, TeamStrategy,
        ToolServerSettings,
    },
    model::{ModelProperties, ModelResource, ProviderKind},
    tool::{HttpToolSpec, McpToolSpec, ToolResource, ToolServer, ToolServerTransport, ToolSpec},
};
pub use tool::{
    NOOP_TOOL, TERMINATE_TOOL,
    entities::{ToolDefinition, ToolFunction, ToolPartial},
    value_objects::{ToolKind, ToolOutput, ToolResult},
};
