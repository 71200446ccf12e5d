//! Model Context Protocol client
//!
//! JSON-RPC 2.0 over HTTP, in either the streamable-HTTP or the SSE
//! transport. [`McpConnector`] plugs into the application's connection
//! pool; everything else is internal.

pub mod client;
pub mod connector;
pub mod error;
pub mod protocol;
mod transport;

pub use client::McpClient;
pub use connector::McpConnector;
pub use error::McpError;
