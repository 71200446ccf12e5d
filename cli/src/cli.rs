//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for conductor
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about = "Run queries against agents, teams, models and tools")]
#[command(long_about = r#"
Conductor loads declarative resources from a TOML manifest and drives queries
to completion, printing each query's final status as JSON.

Configuration files are loaded from (in priority order):
1. --config <path>     Explicit config file
2. ./conductor.toml    Project-level config
3. ~/.config/conductor/config.toml   Global config

Example:
  conductor --manifest resources.toml
  conductor --manifest resources.toml --query weather
  conductor --manifest resources.toml --probe-models
"#)]
pub struct Cli {
    /// Manifest with models, agents, teams, tools, tool servers and queries
    #[arg(short, long, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Query to run, as `name` or `namespace/name` (default: every query)
    #[arg(short, long, value_name = "QUERY")]
    pub query: Vec<String>,

    /// Check every model in the manifest and exit
    #[arg(long)]
    pub probe_models: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
