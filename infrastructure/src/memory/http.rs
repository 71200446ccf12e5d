//! HTTP memory client
//!
//! The service exposes three endpoints:
//!
//! - `POST {base}/conversations` returns `{"conversation_id": ...}`
//! - `GET {base}/messages?conversation_id=...` returns `{"messages": [{"message": ...}]}`
//! - `POST {base}/messages` appends `{conversation_id, query_id, messages}`

use async_trait::async_trait;
use conductor_application::ports::memory::{Memory, MemoryError, MemoryFactory, NoopMemory};
use conductor_application::ports::resource_store::ResourceStore;
use conductor_domain::{Message, Query};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CreateConversationResponse {
    conversation_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    message: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    conversation_id: &'a str,
    query_id: &'a str,
    messages: &'a [Message],
}

fn request_error(err: reqwest::Error) -> MemoryError {
    if err.is_decode() {
        MemoryError::InvalidResponse(err.to_string())
    } else {
        MemoryError::Unreachable(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(MemoryError::NotFound(message));
    }
    Err(MemoryError::RequestFailed {
        status: status.as_u16(),
        message,
    })
}

/// Memory bound to one conversation on a memory service.
#[derive(Debug, Clone)]
pub struct HttpMemory {
    client: reqwest::Client,
    base_url: String,
    conversation_id: String,
}

impl HttpMemory {
    /// Attach to `conversation_id`, creating a new conversation when none is given.
    pub async fn connect(
        client: reqwest::Client,
        base_url: &str,
        conversation_id: Option<&str>,
    ) -> Result<Self, MemoryError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let conversation_id = match conversation_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Self::create_conversation(&client, &base_url).await?,
        };
        Ok(Self {
            client,
            base_url,
            conversation_id,
        })
    }

    async fn create_conversation(
        client: &reqwest::Client,
        base_url: &str,
    ) -> Result<String, MemoryError> {
        let response = client
            .post(format!("{base_url}/conversations"))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(request_error)?;
        let created: CreateConversationResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(request_error)?;
        info!(conversation_id = %created.conversation_id, "Created conversation");
        Ok(created.conversation_id)
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url)
    }
}

#[async_trait]
impl Memory for HttpMemory {
    fn conversation_id(&self) -> Option<String> {
        Some(self.conversation_id.clone())
    }

    async fn get_messages(&self) -> Result<Vec<Message>, MemoryError> {
        let response = self
            .client
            .get(self.messages_url())
            .query(&[("conversation_id", self.conversation_id.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(request_error)?;
        let body: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        let messages: Vec<Message> = body
            .messages
            .iter()
            .map(|record| Message::from_record(&record.message))
            .collect();
        debug!(conversation_id = %self.conversation_id, count = messages.len(), "Loaded history");
        Ok(messages)
    }

    async fn add_messages(&self, query_id: &str, messages: &[Message]) -> Result<(), MemoryError> {
        if messages.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.messages_url())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&MessagesRequest {
                conversation_id: &self.conversation_id,
                query_id,
                messages,
            })
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await?;
        debug!(conversation_id = %self.conversation_id, count = messages.len(), "Stored messages");
        Ok(())
    }
}

/// Resolves the memory service for each query.
///
/// A query naming a memory resource uses that resource's address; otherwise
/// the configured default service is used. With neither, the query runs on
/// [`NoopMemory`].
pub struct HttpMemoryFactory {
    client: reqwest::Client,
    default_url: Option<Url>,
    store: Arc<dyn ResourceStore>,
}

impl HttpMemoryFactory {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        default_url: Option<Url>,
        timeout: Duration,
    ) -> Result<Self, MemoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(request_error)?;
        Ok(Self {
            client,
            default_url,
            store,
        })
    }

    async fn address(&self, query: &Query) -> Result<Option<String>, MemoryError> {
        match query.memory.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => {
                let resource = self
                    .store
                    .get_memory(&query.key.namespace, name)
                    .await
                    .map_err(|e| MemoryError::NotFound(e.to_string()))?;
                Ok(Some(resource.address))
            }
            None => Ok(self.default_url.as_ref().map(|url| url.as_str().to_string())),
        }
    }
}

#[async_trait]
impl MemoryFactory for HttpMemoryFactory {
    async fn for_query(&self, query: &Query) -> Result<Arc<dyn Memory>, MemoryError> {
        let Some(address) = self.address(query).await? else {
            debug!(query = %query.key, "No memory configured");
            return Ok(Arc::new(NoopMemory));
        };
        let memory = HttpMemory::connect(
            self.client.clone(),
            &address,
            query.conversation_id.as_deref(),
        )
        .await?;
        Ok(Arc::new(memory))
    }
}
