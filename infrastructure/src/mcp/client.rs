//! MCP client over HTTP
//!
//! One [`McpClient`] is one established connection: the transport is open
//! and the `initialize` handshake has completed.

use super::error::{McpError, Result};
use super::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult,
};
use super::transport::{HttpTransport, SseTransport, Transport, header_map};
use async_trait::async_trait;
use conductor_application::ports::tool_server::{
    CallContent, CallToolOutput, ConnectRequest, ConnectionError, RemoteTool, ToolServerClient,
};
use conductor_domain::ToolServerTransport;
use conductor_domain::tool::entities::default_parameters;
use serde_json::{Value, json};
use tracing::{debug, info};

pub struct McpClient {
    server: String,
    transport: Transport,
}

impl McpClient {
    /// Open the transport named by `request` and run the handshake.
    pub async fn connect(client: reqwest::Client, request: &ConnectRequest) -> Result<Self> {
        let headers = header_map(request)?;
        let transport = match request.transport {
            ToolServerTransport::Http => Transport::Http(HttpTransport::new(
                client,
                request.endpoint.clone(),
                headers,
            )),
            ToolServerTransport::Sse => {
                Transport::Sse(SseTransport::connect(client, &request.endpoint, headers).await?)
            }
        };

        let this = Self {
            server: request.server.clone(),
            transport,
        };
        let init = this.initialize().await?;
        info!(
            server = %this.server,
            protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
            "Connected to MCP server"
        );
        Ok(this)
    }

    async fn initialize(&self) -> Result<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.call("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        self.transport
            .notify(&JsonRpcNotification::new("notifications/initialized"))
            .await?;
        Ok(init)
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(method, params);
        let response = self.transport.request(&request).await?;
        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| McpError::UnexpectedResponse(format!("{method}: missing result")))
    }

    async fn list_all(&self) -> Result<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let page: ListToolsResult =
                serde_json::from_value(self.call("tools/list", params).await?)?;
            tools.extend(page.tools.into_iter().map(|tool| RemoteTool {
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema.unwrap_or_else(default_parameters),
                name: tool.name,
            }));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(server = %self.server, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    async fn call_named(&self, name: &str, arguments: Value) -> Result<CallToolOutput> {
        let params = serde_json::to_value(CallToolParams { name, arguments })?;
        let result: CallToolResult =
            serde_json::from_value(self.call("tools/call", Some(params)).await?)?;
        Ok(CallToolOutput {
            content: result.content.into_iter().map(content_item).collect(),
            is_error: result.is_error,
        })
    }
}

fn content_item(item: Value) -> CallContent {
    if item.get("type").and_then(Value::as_str) == Some("text")
        && let Some(text) = item.get("text").and_then(Value::as_str)
    {
        return CallContent::Text(text.to_string());
    }
    CallContent::Other(item)
}

#[async_trait]
impl ToolServerClient for McpClient {
    async fn list_tools(&self) -> std::result::Result<Vec<RemoteTool>, ConnectionError> {
        Ok(self.list_all().await?)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> std::result::Result<CallToolOutput, ConnectionError> {
        Ok(self.call_named(name, arguments).await?)
    }

    async fn close(&self) -> std::result::Result<(), ConnectionError> {
        debug!(server = %self.server, "Closing MCP client");
        Ok(self.transport.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Recorded, StubResponse, StubServer};
    use std::collections::BTreeMap;

    fn connect_request(endpoint: String, transport: ToolServerTransport) -> ConnectRequest {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer gh-token".to_string());
        ConnectRequest {
            server: "default/github".to_string(),
            endpoint,
            transport,
            headers,
            timeout: None,
        }
    }

    /// A streamable-HTTP MCP server: JSON for `initialize` and `tools/call`,
    /// an event stream for `tools/list`.
    fn mcp_server(req: &Recorded) -> StubResponse {
        if req.method == "DELETE" {
            return StubResponse::text(200, "");
        }
        let body = req.json();
        let id = body["id"].clone();
        match body["method"].as_str().unwrap_or_default() {
            "initialize" => StubResponse::json(
                200,
                json!({"jsonrpc": "2.0", "id": id, "result": {"protocolVersion": "2025-03-26", "capabilities": {}}}),
            )
            .with_header("Mcp-Session-Id", "sess-42"),
            "notifications/initialized" => StubResponse::text(202, ""),
            "tools/list" => {
                let page = if body["params"]["cursor"] == json!("p2") {
                    json!({"tools": [{"name": "create_issue"}]})
                } else {
                    json!({"tools": [{"name": "search", "description": "Search code", "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}}], "nextCursor": "p2"})
                };
                StubResponse::sse(format!(
                    "event: message\ndata: {}\n\nevent: message\ndata: {}\n\n",
                    json!({"jsonrpc": "2.0", "method": "notifications/progress"}),
                    json!({"jsonrpc": "2.0", "id": id, "result": page})
                ))
            }
            "tools/call" => StubResponse::json(
                200,
                json!({"jsonrpc": "2.0", "id": id, "result": {
                    "content": [{"type": "text", "text": "3 results"}, {"type": "resource", "uri": "file:///a"}],
                    "isError": body["params"]["name"] == json!("broken")
                }}),
            ),
            _ => StubResponse::json(
                200,
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}}),
            ),
        }
    }

    #[tokio::test]
    async fn test_handshake_carries_session_and_accept_headers() {
        let server = StubServer::with_handler(mcp_server).await;
        let client = McpClient::connect(
            reqwest::Client::new(),
            &connect_request(format!("{}/mcp", server.url()), ToolServerTransport::Http),
        )
        .await
        .unwrap();
        client.list_tools().await.unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].json()["method"], json!("initialize"));
        assert_eq!(requests[0].header("mcp-session-id"), None);
        assert_eq!(
            requests[0].header("accept"),
            Some("application/json, text/event-stream")
        );
        assert_eq!(requests[0].header("authorization"), Some("Bearer gh-token"));
        assert_eq!(requests[1].json()["method"], json!("notifications/initialized"));
        assert_eq!(requests[1].header("mcp-session-id"), Some("sess-42"));
        assert_eq!(requests[2].header("mcp-session-id"), Some("sess-42"));
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor_and_reads_event_stream() {
        let server = StubServer::with_handler(mcp_server).await;
        let client = McpClient::connect(
            reqwest::Client::new(),
            &connect_request(format!("{}/mcp", server.url()), ToolServerTransport::Http),
        )
        .await
        .unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["search", "create_issue"]);
        assert_eq!(tools[0].description, "Search code");
        assert_eq!(tools[1].input_schema, default_parameters());
    }

    #[tokio::test]
    async fn test_call_tool_maps_content_and_error_flag() {
        let server = StubServer::with_handler(mcp_server).await;
        let client = McpClient::connect(
            reqwest::Client::new(),
            &connect_request(format!("{}/mcp", server.url()), ToolServerTransport::Http),
        )
        .await
        .unwrap();

        let output = client.call_tool("search", json!({"q": "x"})).await.unwrap();
        assert!(!output.is_error);
        assert_eq!(output.content[0], CallContent::Text("3 results".to_string()));
        assert!(matches!(output.content[1], CallContent::Other(_)));

        let output = client.call_tool("broken", json!({})).await.unwrap();
        assert!(output.is_error);

        client.close().await.unwrap();
        let last = server.requests().pop().unwrap();
        assert_eq!(last.method, "DELETE");
        assert_eq!(last.header("mcp-session-id"), Some("sess-42"));
    }

    #[tokio::test]
    async fn test_rpc_error_becomes_protocol_error() {
        let server = StubServer::with_handler(|req| {
            let id = req.json()["id"].clone();
            StubResponse::json(
                200,
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32602, "message": "bad params"}}),
            )
        })
        .await;

        let err = McpClient::connect(
            reqwest::Client::new(),
            &connect_request(format!("{}/mcp", server.url()), ToolServerTransport::Http),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, McpError::Rpc { code: -32602, .. }));
        assert!(!ConnectionError::from(err).is_retryable());
    }
}
