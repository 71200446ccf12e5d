//! Azure OpenAI flavour of the OpenAI provider.

use super::openai::{Credentials, OpenAiProvider};
use conductor_application::ports::chat_provider::ProviderError;
use conductor_domain::ModelResource;

impl OpenAiProvider {
    /// Provider scoped to the deployment named by `model.model`.
    ///
    /// Requests go to `{base_url}/openai/deployments/{model}` with the key in
    /// an `api-key` header and `api-version` as a query parameter.
    pub fn azure(client: reqwest::Client, model: &ModelResource) -> Result<Self, ProviderError> {
        let api_key = model.api_key.clone().ok_or_else(|| {
            ProviderError::Configuration(format!("azure model '{}' has no api_key", model.meta.name))
        })?;

        let base_url = format!(
            "{}/openai/deployments/{}",
            model.base_url.trim_end_matches('/'),
            model.model
        );
        let query = model
            .api_version
            .iter()
            .map(|v| ("api-version", v.clone()))
            .collect();

        Ok(Self::with_endpoint(
            client,
            model,
            base_url,
            Credentials::ApiKeyHeader(api_key),
            query,
        ))
    }
}
