//! Tool server connection pool configuration (`[pool]` section)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePoolConfig {
    /// Connection attempts including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt, doubled after each failure
    pub base_delay_ms: u64,
    /// Bound on the whole connection loop
    pub connect_timeout_secs: u64,
}

impl Default for FilePoolConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            connect_timeout_secs: 30,
        }
    }
}
