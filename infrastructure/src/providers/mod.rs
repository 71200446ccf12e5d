//! Chat provider adapters
//!
//! Three backends sit behind the [`ChatProvider`] port:
//!
//! - [`OpenAiProvider`]: OpenAI-compatible REST with SSE streaming
//! - the same client in Azure mode (deployment-scoped URL, `api-key` header)
//! - [`BedrockProvider`]: JSON model invocation without native streaming
//!
//! [`HttpProviderFactory`] picks one per [`ModelResource`] and shares a
//! single `reqwest::Client` between all of them.

mod azure;
mod bedrock;
mod openai;
mod probe;
mod wire;

pub use bedrock::BedrockProvider;
pub use openai::OpenAiProvider;
pub use probe::{ModelProbe, ProbeResult};

use conductor_application::ports::chat_provider::{ChatProvider, ProviderError, ProviderFactory};
use conductor_domain::{ModelResource, ProviderKind};
use std::sync::Arc;
use tracing::debug;

/// Builds reqwest-backed providers for model resources.
#[derive(Debug, Clone, Default)]
pub struct HttpProviderFactory {
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, model: &ModelResource) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        if model.base_url.trim().is_empty() {
            return Err(ProviderError::Configuration(format!(
                "model '{}' has no base_url",
                model.meta.name
            )));
        }
        debug!(model = %model.meta.name, provider = %model.provider, "Creating chat provider");

        let provider: Arc<dyn ChatProvider> = match model.provider {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::openai(self.client.clone(), model)),
            ProviderKind::Azure => Arc::new(OpenAiProvider::azure(self.client.clone(), model)?),
            ProviderKind::Bedrock => Arc::new(BedrockProvider::new(self.client.clone(), model)),
        };
        Ok(provider)
    }
}

/// Map a reqwest failure onto the provider error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::ConnectionError(err.to_string())
    }
}

/// Pass successful responses through; turn the rest into `ProviderError::Http`.
///
/// The message is taken from an `{"error": {"message"}}` or `{"message"}`
/// body when present so it stays stable across retries.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        message: error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
    })
}

fn error_message(body: &str) -> Option<String> {
    if let Ok(envelope) = serde_json::from_str::<wire::ErrorEnvelope>(body) {
        return Some(envelope.error.message);
    }
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
