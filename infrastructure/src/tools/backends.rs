//! reqwest-backed implementations of the tool framework's backends.

use super::http::HttpToolExecutor;
use crate::mcp::McpConnector;
use conductor_application::ports::tool_executor::ToolExecutor;
use conductor_application::ports::tool_server::{ToolBackends, ToolServerConnector};
use conductor_domain::{HttpToolSpec, ToolResource};
use std::sync::Arc;
use std::time::Duration;

/// HTTP tools share one client; tool servers are reached over MCP.
pub struct ReqwestToolBackends {
    client: reqwest::Client,
    http_timeout: Duration,
    connector: Arc<McpConnector>,
}

impl ReqwestToolBackends {
    pub fn new(http_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            http_timeout,
            connector: Arc::new(McpConnector::new()),
        }
    }
}

impl ToolBackends for ReqwestToolBackends {
    fn http_executor(&self, tool: &ToolResource, spec: &HttpToolSpec) -> Arc<dyn ToolExecutor> {
        Arc::new(HttpToolExecutor::new(
            self.client.clone(),
            tool,
            spec,
            self.http_timeout,
        ))
    }

    fn connector(&self) -> Arc<dyn ToolServerConnector> {
        Arc::clone(&self.connector) as Arc<dyn ToolServerConnector>
    }
}
