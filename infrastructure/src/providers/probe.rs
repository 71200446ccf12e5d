//! Model availability probe
//!
//! The message produced here is written into status records, so it must be
//! stable: request ids and other per-call noise never leak into it.

use conductor_application::ports::chat_provider::{ChatProvider, ProviderError};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub available: bool,
    pub message: String,
    /// Full error text, for logs only.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelProbe {
    timeout: Duration,
}

impl ModelProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn probe(&self, provider: &dyn ChatProvider) -> ProbeResult {
        let outcome = tokio::time::timeout(self.timeout, provider.health_check())
            .await
            .unwrap_or(Err(ProviderError::Timeout));

        match outcome {
            Ok(()) => {
                debug!(model = provider.model(), "Model probe succeeded");
                ProbeResult {
                    available: true,
                    message: "Model is available".to_string(),
                    detail: None,
                }
            }
            Err(err) => {
                warn!(model = provider.model(), error = %err, "Model probe failed");
                ProbeResult {
                    available: false,
                    message: stable_message(&err, self.timeout),
                    detail: Some(err.to_string()),
                }
            }
        }
    }
}

fn stable_message(err: &ProviderError, timeout: Duration) -> String {
    match err {
        ProviderError::Timeout => format!(
            "Probe failed (timeout after {} seconds)",
            timeout.as_secs()
        ),
        ProviderError::Http { status, message } => format!("{message} ({status})"),
        ProviderError::ConnectionError(_) => "Probe failed (connection error)".to_string(),
        ProviderError::Configuration(_) => "Probe failed (configuration error)".to_string(),
        _ => "Probe failed (unknown error)".to_string(),
    }
}
