//! Engine configuration from TOML (`[engine]` section)

use serde::{Deserialize, Serialize};

/// Raw engine configuration from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEngineConfig {
    /// Per-target timeout applied when a query sets none
    pub default_target_timeout_secs: u64,
    /// Model turns allowed in one agent's tool loop
    pub max_agent_turns: usize,
}

impl Default for FileEngineConfig {
    fn default() -> Self {
        Self {
            default_target_timeout_secs: 300,
            max_agent_turns: 10,
        }
    }
}
