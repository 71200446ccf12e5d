//! Tool execution configuration (`[tools]` and `[probe]` sections)

use serde::{Deserialize, Serialize};

/// Raw tools configuration from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileToolsConfig {
    /// Timeout for HTTP tools that do not set their own
    pub http_timeout_secs: u64,
}

impl Default for FileToolsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
        }
    }
}

/// Model availability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProbeConfig {
    pub timeout_secs: u64,
}

impl Default for FileProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}
