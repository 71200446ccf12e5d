//! Conversation memory service configuration (`[memory]` section)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMemoryConfig {
    /// Base URL of the memory service; queries run without memory when unset
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FileMemoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}
