//! Tool domain: definitions, partial/filter transforms and results.

pub mod entities;
pub mod value_objects;

/// Name of the builtin tool that echoes its arguments.
pub const NOOP_TOOL: &str = "noop";

/// Name of the builtin tool that ends an agent's tool loop.
pub const TERMINATE_TOOL: &str = "terminate";
