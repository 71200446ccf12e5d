//! Model resources and the backends that serve them

use super::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a model backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions with SSE streaming.
    #[default]
    OpenAi,
    /// Azure OpenAI: deployment-scoped URLs and an `api-key` header.
    Azure,
    /// JSON model invocation without native streaming.
    Bedrock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Bedrock => "bedrock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelProperties {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResource {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default)]
    pub provider: ProviderKind,
    /// Backend model id (deployment name for Azure).
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Azure `api-version` query parameter.
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub properties: ModelProperties,
}
