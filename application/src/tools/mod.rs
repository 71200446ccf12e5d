//! Tool invocation framework
//!
//! - [`ToolRegistry`]: exposed name to definition and executor
//! - [`ToolRegistryBuilder`]: agent tool references to a registry
//! - [`ConnectionPool`]: shared tool server clients for one invocation
//! - executors for builtins, tool servers, agent delegation and the
//!   partial/filter decorators

pub mod agent;
pub mod builder;
pub mod executors;
pub mod mcp;
pub mod pool;
pub mod registry;

pub use agent::{AgentDelegateExecutor, AgentInvoker};
pub use builder::{ToolBuildError, ToolRegistryBuilder};
pub use executors::{
    FilteredExecutor, NoopExecutor, PartialExecutor, TerminateExecutor, noop_definition,
    terminate_definition,
};
pub use mcp::McpExecutor;
pub use pool::{ConnectionPool, PoolKey};
pub use registry::ToolRegistry;
