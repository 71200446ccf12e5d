//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod chat_provider;
pub mod event_stream;
pub mod memory;
pub mod resource_store;
pub mod telemetry;
pub mod tool_executor;
pub mod tool_server;
