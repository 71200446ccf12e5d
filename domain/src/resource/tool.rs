//! Tool resources and external tool servers

use super::ObjectMeta;
use crate::tool::entities::{ToolDefinition, default_parameters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpToolSpec {
    /// May contain `{param}` placeholders filled from call arguments.
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpToolSpec {
    /// Tool server name.
    pub server: String,
    /// Defaults to the tool's own namespace.
    #[serde(default)]
    pub server_namespace: Option<String>,
    /// Tool name as published by the server.
    pub tool_name: String,
}

/// How a tool is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolSpec {
    Http(HttpToolSpec),
    Mcp(McpToolSpec),
    Agent { agent: String },
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResource {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    pub spec: ToolSpec,
}

impl ToolResource {
    /// Canonical definition exposed to models.
    pub fn definition(&self) -> ToolDefinition {
        let description = if !self.description.is_empty() {
            self.description.clone()
        } else {
            match &self.spec {
                ToolSpec::Http(http) => format!("HTTP request to {}", http.url),
                ToolSpec::Builtin => format!("Built-in tool: {}", self.meta.name),
                _ => format!("Custom tool: {}", self.meta.name),
            }
        };

        ToolDefinition {
            name: self.meta.name.clone(),
            description,
            parameters: self.input_schema.clone().unwrap_or_else(default_parameters),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolServerTransport {
    /// Long-lived eventing transport, no per-request timeout.
    Sse,
    /// Bounded request/response transport.
    #[default]
    Http,
}

impl ToolServerTransport {
    pub fn sub_path(&self) -> &'static str {
        match self {
            ToolServerTransport::Sse => "sse",
            ToolServerTransport::Http => "mcp",
        }
    }
}

/// An external tool server speaking the tool-serving protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServer {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    pub address: String,
    #[serde(default)]
    pub transport: ToolServerTransport,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ToolServer {
    /// Address joined with the transport's sub-path.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.address.trim_end_matches('/'),
            self.transport.sub_path()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(spec: ToolSpec) -> ToolResource {
        ToolResource {
            meta: ObjectMeta::new("default", "lookup"),
            description: String::new(),
            input_schema: None,
            spec,
        }
    }

    #[test]
    fn test_description_fallbacks() {
        let http = tool(ToolSpec::Http(HttpToolSpec {
            url: "https://api.example.com/{id}".to_string(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            timeout_secs: None,
        }));
        assert_eq!(
            http.definition().description,
            "HTTP request to https://api.example.com/{id}"
        );
        assert_eq!(tool(ToolSpec::Builtin).definition().description, "Built-in tool: lookup");
        assert_eq!(
            tool(ToolSpec::Agent { agent: "helper".to_string() }).definition().description,
            "Custom tool: lookup"
        );
    }

    #[test]
    fn test_definition_keeps_schema() {
        let mut resource = tool(ToolSpec::Builtin);
        resource.input_schema = Some(json!({"type": "object", "properties": {"q": {}}}));
        resource.description = "Search".to_string();
        let definition = resource.definition();
        assert_eq!(definition.description, "Search");
        assert!(definition.parameters["properties"].get("q").is_some());
    }

    #[test]
    fn test_endpoint_sub_paths() {
        let mut server = ToolServer {
            meta: ObjectMeta::new("default", "github"),
            address: "http://mcp.local:8080/".to_string(),
            transport: ToolServerTransport::Sse,
            headers: BTreeMap::new(),
            timeout_secs: None,
        };
        assert_eq!(server.endpoint(), "http://mcp.local:8080/sse");
        server.transport = ToolServerTransport::Http;
        assert_eq!(server.endpoint(), "http://mcp.local:8080/mcp");
    }

    #[test]
    fn test_spec_deserialization() {
        let spec: ToolSpec = serde_json::from_value(json!({
            "type": "mcp",
            "server": "github",
            "tool_name": "search_issues"
        }))
        .unwrap();
        assert!(matches!(spec, ToolSpec::Mcp(ref m) if m.tool_name == "search_issues"));
    }
}
