//! HTTP tool executor
//!
//! A tool resource with an HTTP spec becomes one request per call. `{name}`
//! placeholders in the URL are filled from the call arguments and
//! query-escaped; the body template is filled verbatim and only sent for
//! POST, PUT and PATCH.

use async_trait::async_trait;
use conductor_application::ports::tool_executor::{ToolError, ToolExecutor, ToolFailure};
use conductor_domain::{HttpToolSpec, ToolCall, ToolKind, ToolResource, ToolResult};
use reqwest::Method;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Maximum response body size (5 MB)
const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

pub struct HttpToolExecutor {
    client: reqwest::Client,
    tool: String,
    spec: HttpToolSpec,
    timeout: Duration,
}

impl HttpToolExecutor {
    pub fn new(
        client: reqwest::Client,
        tool: &ToolResource,
        spec: &HttpToolSpec,
        default_timeout: Duration,
    ) -> Self {
        Self {
            client,
            tool: tool.meta.name.clone(),
            spec: spec.clone(),
            timeout: spec
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
        }
    }

    fn method(&self) -> Result<Method, ToolError> {
        let method = self.spec.method.trim();
        if method.is_empty() {
            return Ok(Method::GET);
        }
        Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| ToolError::Execution(format!("invalid HTTP method '{method}'")))
    }

    async fn send(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let method = self.method()?;
        let url = substitute(&self.spec.url, arguments, query_escape);
        let url = reqwest::Url::parse(&url)
            .map_err(|e| ToolError::Execution(format!("invalid URL: {e}")))?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .timeout(self.timeout);
        for (name, value) in &self.spec.headers {
            request = request.header(name, value);
        }
        if matches!(method, Method::POST | Method::PUT | Method::PATCH)
            && let Some(template) = &self.spec.body
            && !template.is_empty()
        {
            request = request.body(substitute(template, arguments, |v| v.to_string()));
        }

        info!(tool = %self.tool, method = %method, url = %url, "Making HTTP request");
        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to fetch URL: {e}")))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ToolError::Execution(format!(
                "HTTP error {}: {} (URL: {})",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to read response: {e}")))?;
        if body.len() > MAX_BODY_SIZE {
            return Err(ToolError::Execution(format!(
                "Response too large: {} bytes",
                body.len()
            )));
        }
        debug!(tool = %self.tool, status = status.as_u16(), size = body.len(), "HTTP request completed");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        let arguments = call.parse_arguments().map_err(|e| {
            ToolFailure::new(
                call,
                ToolError::InvalidArguments(format!("failed to parse arguments: {e}")),
            )
        })?;

        match self.send(&arguments).await {
            Ok(content) => Ok(ToolResult::success(&call.id, &call.name, content)),
            Err(error) => Err(ToolFailure::new(call, error)),
        }
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Http
    }
}

/// Replace `{name}` placeholders whose name is a known argument.
///
/// Only identifier-shaped names are placeholders, so literal JSON braces in
/// a body template pass through untouched, as do unknown names.
fn substitute(template: &str, arguments: &Map<String, Value>, encode: fn(&str) -> String) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        match (after[name_len..].starts_with('}'), arguments.get(name)) {
            (true, Some(value)) if !name.is_empty() => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&encode(&text));
                rest = &after[name_len + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
