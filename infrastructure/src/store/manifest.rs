//! TOML manifest of declarative resources
//!
//! ```toml
//! [[models]]
//! name = "gpt"
//! model = "gpt-4o"
//! base_url = "https://api.openai.com/v1"
//!
//! [[agents]]
//! name = "weather-agent"
//! model_ref = "gpt"
//! tools = [{ name = "weather" }]
//!
//! [[tools]]
//! name = "weather"
//! spec = { type = "http", url = "https://wttr.in/{city}?format=3" }
//!
//! [[queries]]
//! name = "q1"
//! input = "What's the weather in Oslo?"
//! targets = [{ type = "agent", name = "weather-agent" }]
//! ```
//!
//! Every resource defaults to the `default` namespace. References between
//! resources are checked when the manifest is loaded, so a bad reference
//! fails the load instead of a query.

use conductor_domain::{
    Agent, AgentToolKind, DomainError, LabelSelector, MemoryResource, Message, ModelResource,
    NOOP_TOOL, ObjectMeta, Query, QueryKey, TERMINATE_TOOL, Target, Team, ToolResource,
    ToolServer, ToolSpec,
};
use conductor_domain::resource::default_namespace;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate {kind} {namespace}/{name}")]
    Duplicate {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{owner}: {source}")]
    InvalidSelector {
        owner: String,
        #[source]
        source: DomainError,
    },

    #[error("{owner} references unknown {kind} '{name}'")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        name: String,
    },

    #[error("query {0} names no targets and no selector")]
    NoTargets(String),
}

/// Query input: plain text becomes one user message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueryInput {
    Text(String),
    Messages(Vec<Message>),
}

impl QueryInput {
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            QueryInput::Text(text) => vec![Message::user(text)],
            QueryInput::Messages(messages) => messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryManifest {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub input: QueryInput,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub selector: Option<LabelSelector>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub streaming: bool,
}

impl QueryManifest {
    pub fn key(&self) -> QueryKey {
        QueryKey::new(&self.namespace, &self.name)
    }

    pub fn into_query(self) -> Query {
        let mut query = Query::new(self.key(), self.input.into_messages())
            .with_targets(self.targets)
            .with_streaming(self.streaming);
        query.selector = self.selector;
        query.session_id = self.session_id;
        query.conversation_id = self.conversation_id;
        query.memory = self.memory;
        query.timeout = self.timeout_secs.map(Duration::from_secs);
        query.ttl = self.ttl_secs.map(Duration::from_secs);
        query
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub models: Vec<ModelResource>,
    pub agents: Vec<Agent>,
    pub teams: Vec<Team>,
    pub tools: Vec<ToolResource>,
    pub tool_servers: Vec<ToolServer>,
    pub memories: Vec<MemoryResource>,
    pub queries: Vec<QueryManifest>,
}

impl Manifest {
    /// Read, parse and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        let agents = unique("agent", self.agents.iter().map(|a| &a.meta))?;
        unique("team", self.teams.iter().map(|t| &t.meta))?;
        unique("model", self.models.iter().map(|m| &m.meta))?;
        let tools = unique("tool", self.tools.iter().map(|t| &t.meta))?;
        let servers = unique("tool server", self.tool_servers.iter().map(|s| &s.meta))?;
        let memories = unique("memory", self.memories.iter().map(|m| &m.meta))?;
        unique_queries(&self.queries)?;

        for agent in &self.agents {
            let owner = format!("agent {}/{}", agent.meta.namespace, agent.meta.name);
            for tool in &agent.tools {
                let known = match tool.kind {
                    AgentToolKind::Builtin => [NOOP_TOOL, TERMINATE_TOOL].contains(&tool.name.as_str()),
                    AgentToolKind::Custom => tools.contains(&(agent.meta.namespace.as_str(), tool.name.as_str())),
                };
                if !known {
                    return Err(unknown(&owner, "tool", &tool.name));
                }
            }
        }

        for team in &self.teams {
            let owner = format!("team {}/{}", team.meta.namespace, team.meta.name);
            for member in &team.members {
                if !agents.contains(&(team.meta.namespace.as_str(), member.as_str())) {
                    return Err(unknown(&owner, "agent", member));
                }
            }
        }

        for tool in &self.tools {
            let owner = format!("tool {}/{}", tool.meta.namespace, tool.meta.name);
            match &tool.spec {
                ToolSpec::Mcp(mcp) => {
                    let namespace = mcp
                        .server_namespace
                        .as_deref()
                        .unwrap_or(&tool.meta.namespace);
                    if !servers.contains(&(namespace, mcp.server.as_str())) {
                        return Err(unknown(&owner, "tool server", &mcp.server));
                    }
                }
                ToolSpec::Agent { agent } => {
                    if !agents.contains(&(tool.meta.namespace.as_str(), agent.as_str())) {
                        return Err(unknown(&owner, "agent", agent));
                    }
                }
                ToolSpec::Http(_) | ToolSpec::Builtin => {}
            }
        }

        for query in &self.queries {
            let owner = format!("query {}/{}", query.namespace, query.name);
            if let Some(selector) = &query.selector {
                selector
                    .validate()
                    .map_err(|source| ManifestError::InvalidSelector {
                        owner: owner.clone(),
                        source,
                    })?;
            }
            if query.targets.is_empty() && query.selector.is_none() {
                return Err(ManifestError::NoTargets(owner));
            }
            if let Some(memory) = &query.memory
                && !memories.contains(&(query.namespace.as_str(), memory.as_str()))
            {
                return Err(unknown(&owner, "memory", memory));
            }
        }
        Ok(())
    }
}

fn unknown(owner: &str, kind: &'static str, name: &str) -> ManifestError {
    ManifestError::UnknownReference {
        owner: owner.to_string(),
        kind,
        name: name.to_string(),
    }
}

fn unique<'a>(
    kind: &'static str,
    metas: impl Iterator<Item = &'a ObjectMeta>,
) -> Result<HashSet<(&'a str, &'a str)>, ManifestError> {
    let mut seen = HashSet::new();
    for meta in metas {
        if !seen.insert((meta.namespace.as_str(), meta.name.as_str())) {
            return Err(ManifestError::Duplicate {
                kind,
                namespace: meta.namespace.clone(),
                name: meta.name.clone(),
            });
        }
    }
    Ok(seen)
}

fn unique_queries(queries: &[QueryManifest]) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for query in queries {
        if !seen.insert((query.namespace.as_str(), query.name.as_str())) {
            return Err(ManifestError::Duplicate {
                kind: "query",
                namespace: query.namespace.clone(),
                name: query.name.clone(),
            });
        }
    }
    Ok(())
}
