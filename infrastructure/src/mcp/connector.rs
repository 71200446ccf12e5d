//! Connector handed to the tool-server connection pool.

use super::client::McpClient;
use super::error::McpError;
use async_trait::async_trait;
use conductor_application::ports::tool_server::{
    ConnectRequest, ConnectionError, ToolServerClient, ToolServerConnector,
};
use std::sync::Arc;
use tracing::debug;

/// Opens one [`McpClient`] per connection attempt.
///
/// Each client gets its own `reqwest::Client` so the request timeout of a
/// bounded transport never applies to an event-stream transport.
#[derive(Debug, Clone, Default)]
pub struct McpConnector;

impl McpConnector {
    pub fn new() -> Self {
        Self
    }

    fn http_client(request: &ConnectRequest) -> Result<reqwest::Client, McpError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl ToolServerConnector for McpConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        debug!(
            server = %request.server,
            endpoint = %request.endpoint,
            transport = ?request.transport,
            "Connecting to tool server"
        );
        let client = McpClient::connect(Self::http_client(request)?, request).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::ToolServerTransport;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let request = ConnectRequest {
            server: "default/offline".to_string(),
            endpoint: "http://127.0.0.1:9/mcp".to_string(),
            transport: ToolServerTransport::Http,
            headers: BTreeMap::new(),
            timeout: Some(Duration::from_secs(5)),
        };
        let err = McpConnector::new().connect(&request).await.err().unwrap();
        assert!(err.is_retryable(), "{err}");
    }
}
