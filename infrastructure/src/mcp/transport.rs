//! HTTP transports for MCP servers.
//!
//! - [`HttpTransport`] (streamable HTTP): every request is a POST whose
//!   response is either a JSON body or a short event stream carrying the
//!   reply. The server assigns a session id on `initialize` and expects it
//!   back in the `Mcp-Session-Id` header.
//! - [`SseTransport`]: a long-lived GET event stream. The server first names
//!   a message endpoint in an `endpoint` event; requests are POSTed there
//!   and their responses arrive on the stream, correlated by id.

use super::error::{McpError, Result};
use super::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::sse::{SseDecoder, SseFrame};
use conductor_application::ports::tool_server::ConnectRequest;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const SESSION_HEADER: &str = "Mcp-Session-Id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub(crate) enum Transport {
    Http(HttpTransport),
    Sse(SseTransport),
}

impl Transport {
    pub async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        match self {
            Transport::Http(t) => t.request(request).await,
            Transport::Sse(t) => t.request(request).await,
        }
    }

    pub async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        match self {
            Transport::Http(t) => t.post(notification).await.map(|_| ()),
            Transport::Sse(t) => t.post(notification).await,
        }
    }

    pub async fn close(&self) -> Result<()> {
        match self {
            Transport::Http(t) => t.close().await,
            Transport::Sse(t) => {
                t.close().await;
                Ok(())
            }
        }
    }
}

pub(crate) fn header_map(request: &ConnectRequest) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| McpError::InvalidHeader(format!("name '{name}'")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| McpError::InvalidHeader(format!("value for '{}'", name.as_str())))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match body.trim() {
        "" => status.canonical_reason().unwrap_or("request failed").to_string(),
        text => text.to_string(),
    };
    Err(McpError::Http {
        status: status.as_u16(),
        message,
    })
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

/// Decode a frame as a response, ignoring notifications and server requests.
fn frame_response(frame: &SseFrame) -> Option<JsonRpcResponse> {
    match serde_json::from_str::<JsonRpcResponse>(&frame.data) {
        Ok(response) if response.id.is_some() => Some(response),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Ignoring undecodable MCP event");
            None
        }
    }
}

// ==================== Streamable HTTP ====================

pub(crate) struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    session_id: std::sync::RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: String, headers: HeaderMap) -> Self {
        Self {
            client,
            endpoint,
            headers,
            session_id: std::sync::RwLock::new(None),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn post(&self, body: &impl Serialize) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(ACCEPT, ACCEPT_BOTH)
            .json(body);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await?;
        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut slot = self.session_id.write().unwrap_or_else(|e| e.into_inner());
            if slot.as_deref() != Some(id) {
                debug!(endpoint = %self.endpoint, session = id, "MCP session established");
                *slot = Some(id.to_string());
            }
        }
        check_status(response).await
    }

    async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        trace!(method = %request.method, id = request.id, "MCP request");
        let response = self.post(request).await?;
        if !is_event_stream(&response) {
            return Ok(response.json().await?);
        }

        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(response.bytes_stream());
        while let Some(bytes) = body.next().await {
            for frame in decoder.push(&bytes?) {
                if let Some(reply) = frame_response(&frame)
                    && reply.id == Some(request.id)
                {
                    return Ok(reply);
                }
            }
        }
        decoder
            .finish()
            .and_then(|frame| frame_response(&frame))
            .filter(|reply| reply.id == Some(request.id))
            .ok_or(McpError::TransportClosed)
    }

    /// Terminate the server-side session, if one was assigned.
    async fn close(&self) -> Result<()> {
        let Some(id) = self.session_id() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(&self.endpoint)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, id)
            .send()
            .await?;
        // Servers that do not support explicit termination answer 405.
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        check_status(response).await.map(|_| ())
    }
}

// ==================== SSE ====================

pub(crate) struct SseTransport {
    client: reqwest::Client,
    headers: HeaderMap,
    message_url: String,
    pending: Pending,
    cancel: CancellationToken,
}

impl SseTransport {
    /// Open the event stream and wait for the server to name its message endpoint.
    pub async fn connect(
        client: reqwest::Client,
        endpoint: &str,
        headers: HeaderMap,
    ) -> Result<Self> {
        let response = client
            .get(endpoint)
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        tokio::spawn(reader_loop(
            response.bytes_stream(),
            Arc::clone(&pending),
            endpoint_tx,
            cancel.clone(),
        ));

        let path = match endpoint_rx.await {
            Ok(path) => path,
            Err(_) => {
                cancel.cancel();
                return Err(McpError::MissingEndpoint);
            }
        };
        let message_url = reqwest::Url::parse(endpoint)
            .and_then(|base| base.join(&path))
            .map_err(|e| {
                cancel.cancel();
                McpError::UnexpectedResponse(format!("invalid message endpoint '{path}': {e}"))
            })?;
        debug!(endpoint, message_url = %message_url, "MCP event stream open");

        Ok(Self {
            client,
            headers,
            message_url: message_url.to_string(),
            pending,
            cancel,
        })
    }

    async fn post(&self, body: &impl Serialize) -> Result<()> {
        let response = self
            .client
            .post(&self.message_url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        if self.cancel.is_cancelled() {
            return Err(McpError::TransportClosed);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.id, tx);

        if let Err(e) = self.post(request).await {
            self.pending.lock().await.remove(&request.id);
            return Err(e);
        }
        rx.await.map_err(|_| McpError::TransportClosed)
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.pending.lock().await.clear();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns the event stream: hands the endpoint to `connect`, then routes
/// every response to its pending request. Dropping the pending senders on
/// exit wakes all waiters with `TransportClosed`.
async fn reader_loop<S, B>(
    stream: S,
    pending: Pending,
    endpoint_tx: oneshot::Sender<String>,
    cancel: CancellationToken,
) where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let mut stream = Box::pin(stream);
    let mut decoder = SseDecoder::new();
    let mut endpoint_tx = Some(endpoint_tx);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        let bytes = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                warn!(error = %e, "MCP event stream failed");
                break;
            }
            None => {
                debug!("MCP event stream ended");
                break;
            }
        };

        for frame in decoder.push(bytes.as_ref()) {
            if frame.event.as_deref() == Some("endpoint") {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(frame.data.trim().to_string());
                }
                continue;
            }
            let Some(reply) = frame_response(&frame) else {
                continue;
            };
            let Some(id) = reply.id else {
                continue;
            };
            match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(reply);
                }
                None => debug!(id, "No pending MCP request for response"),
            }
        }
    }

    cancel.cancel();
    pending.lock().await.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubResponse, StubServer};
    use conductor_domain::ToolServerTransport;
    use std::collections::BTreeMap;

    #[test]
    fn test_header_map_rejects_invalid_values() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer x".to_string());
        let request = ConnectRequest {
            server: "default/gh".to_string(),
            endpoint: "http://localhost/mcp".to_string(),
            transport: ToolServerTransport::Http,
            headers,
            timeout: None,
        };
        assert_eq!(header_map(&request).unwrap().len(), 1);

        let mut bad = request.clone();
        bad.headers
            .insert("X-Bad".to_string(), "line\nbreak".to_string());
        assert!(matches!(
            header_map(&bad).unwrap_err(),
            McpError::InvalidHeader(_)
        ));
    }

    #[test]
    fn test_frame_response_skips_notifications() {
        let notification = SseFrame {
            event: Some("message".to_string()),
            data: r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#.to_string(),
        };
        assert!(frame_response(&notification).is_none());

        let reply = SseFrame {
            event: None,
            data: r#"{"jsonrpc":"2.0","id":7,"result":{}}"#.to_string(),
        };
        assert_eq!(frame_response(&reply).unwrap().id, Some(7));
    }

    #[tokio::test]
    async fn test_reader_loop_routes_endpoint_and_responses() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (reply_tx, reply_rx) = oneshot::channel();
        pending.lock().await.insert(5, reply_tx);

        let frames: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"event: endpoint\ndata: /messages?sessionId=abc\n\n".to_vec()),
            Ok(b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":5,".to_vec()),
            Ok(b"\"result\":{\"ok\":true}}\n\n".to_vec()),
        ];
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        reader_loop(
            futures::stream::iter(frames),
            Arc::clone(&pending),
            endpoint_tx,
            cancel.clone(),
        )
        .await;

        assert_eq!(endpoint_rx.await.unwrap(), "/messages?sessionId=abc");
        let reply = reply_rx.await.unwrap();
        assert_eq!(reply.result, Some(serde_json::json!({"ok": true})));
        assert!(cancel.is_cancelled());
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sse_connect_resolves_message_endpoint() {
        let server = StubServer::start(vec![StubResponse::sse(
            "event: endpoint\ndata: /messages?sessionId=abc\n\n",
        )])
        .await;

        let transport = SseTransport::connect(
            reqwest::Client::new(),
            &format!("{}/sse", server.url()),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            transport.message_url,
            format!("{}/messages?sessionId=abc", server.url())
        );
        assert_eq!(server.requests()[0].header("accept"), Some("text/event-stream"));
    }

    #[tokio::test]
    async fn test_sse_stream_without_endpoint_fails() {
        let server = StubServer::start(vec![StubResponse::sse(": nothing\n\n")]).await;
        let err = SseTransport::connect(
            reqwest::Client::new(),
            &format!("{}/sse", server.url()),
            HeaderMap::new(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, McpError::MissingEndpoint));
    }
}
