//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and validated into [`Settings`].

mod engine;
mod memory;
mod output;
mod pool;
mod tools;

pub use engine::FileEngineConfig;
pub use memory::FileMemoryConfig;
pub use output::FileOutputConfig;
pub use pool::FilePoolConfig;
pub use tools::{FileProbeConfig, FileToolsConfig};

use conductor_application::{ExecutionParams, RetryPolicy};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("{0} cannot be 0")]
    Zero(&'static str),

    #[error("memory.base_url is not a valid URL: {0}")]
    InvalidMemoryUrl(String),
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub engine: FileEngineConfig,
    pub pool: FilePoolConfig,
    pub memory: FileMemoryConfig,
    pub tools: FileToolsConfig,
    pub probe: FileProbeConfig,
    pub output: FileOutputConfig,
}

/// Memory service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySettings {
    pub base_url: Url,
    pub timeout: Duration,
}

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub params: ExecutionParams,
    pub retry: RetryPolicy,
    pub memory: Option<MemorySettings>,
    pub http_tool_timeout: Duration,
    pub probe_timeout: Duration,
    pub events_file: Option<PathBuf>,
}

fn non_zero(value: u64, field: &'static str) -> Result<u64, ConfigValidationError> {
    if value == 0 {
        return Err(ConfigValidationError::Zero(field));
    }
    Ok(value)
}

impl FileConfig {
    /// Validate the configuration into runtime settings.
    pub fn validate(&self) -> Result<Settings, ConfigValidationError> {
        let target_timeout = non_zero(
            self.engine.default_target_timeout_secs,
            "engine.default_target_timeout_secs",
        )?;
        let max_turns = non_zero(self.engine.max_agent_turns as u64, "engine.max_agent_turns")?;
        let attempts = non_zero(u64::from(self.pool.max_attempts), "pool.max_attempts")?;
        let connect_timeout = non_zero(self.pool.connect_timeout_secs, "pool.connect_timeout_secs")?;
        let http_timeout = non_zero(self.tools.http_timeout_secs, "tools.http_timeout_secs")?;
        let probe_timeout = non_zero(self.probe.timeout_secs, "probe.timeout_secs")?;

        let memory = match &self.memory.base_url {
            Some(raw) => {
                let base_url = Url::parse(raw)
                    .map_err(|e| ConfigValidationError::InvalidMemoryUrl(format!("{raw}: {e}")))?;
                let timeout = non_zero(self.memory.timeout_secs, "memory.timeout_secs")?;
                Some(MemorySettings {
                    base_url,
                    timeout: Duration::from_secs(timeout),
                })
            }
            None => None,
        };

        Ok(Settings {
            params: ExecutionParams::default()
                .with_default_target_timeout(Duration::from_secs(target_timeout))
                .with_max_agent_turns(max_turns as usize),
            retry: RetryPolicy {
                max_attempts: attempts as u32,
                base_delay: Duration::from_millis(self.pool.base_delay_ms),
                connect_timeout: Duration::from_secs(connect_timeout),
            },
            memory,
            http_tool_timeout: Duration::from_secs(http_timeout),
            probe_timeout: Duration::from_secs(probe_timeout),
            events_file: self.output.events_file.clone(),
        })
    }
}
