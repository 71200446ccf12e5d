//! Use cases
//!
//! The query execution engine: orchestrator, resolver, parallel executor,
//! dispatcher and the agent and team runners beneath it.

pub mod agent_runner;
pub mod dispatch;
pub mod execute_targets;
pub mod in_flight;
pub mod orchestrator;
pub mod resolve_targets;
pub mod shared;
pub mod team_runner;
