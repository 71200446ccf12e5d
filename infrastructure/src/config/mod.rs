//! Configuration file loading for conductor
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `--config <path>` specified file
//! 2. Project root: `./conductor.toml`
//! 3. XDG config: `$XDG_CONFIG_HOME/conductor/config.toml`
//! 4. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileConfig, FileEngineConfig, FileMemoryConfig, FileOutputConfig,
    FilePoolConfig, FileProbeConfig, FileToolsConfig, MemorySettings, Settings,
};
pub use loader::ConfigLoader;
