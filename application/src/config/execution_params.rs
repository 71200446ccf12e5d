//! Execution parameters: per-query loop control.
//!
//! [`ExecutionParams`] groups the static parameters that bound one query's
//! execution: the per-target timeout applied when a query sets none, and
//! the tool-loop limit of the agent runner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-target timeout.
pub const DEFAULT_TARGET_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Applied to every target unless the query overrides it.
    pub default_target_timeout: Duration,
    /// Maximum model turns in one agent's tool loop.
    pub max_agent_turns: usize,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            default_target_timeout: DEFAULT_TARGET_TIMEOUT,
            max_agent_turns: 10,
        }
    }
}

impl ExecutionParams {
    pub fn with_default_target_timeout(mut self, timeout: Duration) -> Self {
        self.default_target_timeout = timeout;
        self
    }

    pub fn with_max_agent_turns(mut self, max: usize) -> Self {
        self.max_agent_turns = max;
        self
    }

    /// Timeout for a query's targets.
    pub fn target_timeout(&self, query_timeout: Option<Duration>) -> Duration {
        query_timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.default_target_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_timeout_override() {
        let params = ExecutionParams::default();
        assert_eq!(params.target_timeout(None), Duration::from_secs(300));
        assert_eq!(
            params.target_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(params.target_timeout(Some(Duration::ZERO)), Duration::from_secs(300));
    }
}
