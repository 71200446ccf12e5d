//! Agents and teams

use super::ObjectMeta;
use crate::tool::entities::{ToolFunction, ToolPartial};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentToolKind {
    /// Engine-provided tool (`noop`, `terminate`).
    Builtin,
    /// Tool resource looked up in the store.
    #[default]
    Custom,
}

/// An agent's reference to a tool, with optional exposure overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentToolRef {
    #[serde(default, rename = "type")]
    pub kind: AgentToolKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Restricts which functions of the tool may be called.
    #[serde(default)]
    pub functions: Vec<ToolFunction>,
    #[serde(default)]
    pub partial: Option<ToolPartial>,
}

impl AgentToolRef {
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            kind: AgentToolKind::Builtin,
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A startup call issued once on a freshly connected tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Per-agent settings applied to one tool server connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerSettings {
    /// Override the server's own headers.
    pub headers: BTreeMap<String, String>,
    pub tool_calls: Vec<StartupToolCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model_ref: Option<String>,
    /// When set, execution is delegated to an external engine and the
    /// engine produces no messages here.
    #[serde(default)]
    pub execution_engine: Option<String>,
    #[serde(default)]
    pub tools: Vec<AgentToolRef>,
    /// Keyed by `namespace/name` of the tool server, or its bare name.
    #[serde(default)]
    pub tool_servers: BTreeMap<String, ToolServerSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStrategy {
    #[default]
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strategy: TeamStrategy,
    /// Agent names, run in order.
    pub members: Vec<String>,
}
