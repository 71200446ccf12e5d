//! Infrastructure layer for conductor
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: HTTP chat providers, the MCP tool-server
//! client, HTTP tools, conversation memory, the in-memory resource store,
//! event streams, telemetry and configuration file loading.

pub mod config;
pub mod logging;
pub mod mcp;
pub mod memory;
pub mod providers;
pub mod store;
pub mod telemetry;
pub mod tools;

mod sse;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ConfigLoader, ConfigValidationError, FileConfig, MemorySettings, Settings};
pub use logging::{JsonlEventStream, JsonlEventStreamFactory};
pub use mcp::{McpClient, McpConnector, McpError};
pub use memory::{HttpMemory, HttpMemoryFactory};
pub use providers::{BedrockProvider, HttpProviderFactory, ModelProbe, OpenAiProvider, ProbeResult};
pub use store::{InMemoryResourceStore, Manifest, ManifestError};
pub use telemetry::TracingTelemetry;
pub use tools::{HttpToolExecutor, ReqwestToolBackends};
