//! Tool server connection pool
//!
//! One client per `(namespace, server)`, created under bounded exponential
//! backoff and shared by every tool that targets the server for the
//! lifetime of the pool. A pool belongs to one agent invocation.
//!
//! Creation is single-flight per key: the map lock is only held long
//! enough to fetch the key's [`OnceCell`], and concurrent callers for the
//! same key wait on that cell instead of connecting twice.

use crate::config::RetryPolicy;
use crate::ports::tool_server::{
    ConnectRequest, ConnectionError, ToolServerClient, ToolServerConnector,
};
use conductor_domain::{ToolServer, ToolServerSettings, ToolServerTransport};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Request timeout of the bounded transport when a server sets none.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub namespace: String,
    pub server: String,
}

impl PoolKey {
    pub fn new(namespace: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            server: server.into(),
        }
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.server)
    }
}

/// One key's client. Whoever claims it first is the one that closes it.
#[derive(Default)]
struct SlotState {
    client: OnceCell<Arc<dyn ToolServerClient>>,
    released: AtomicBool,
}

impl SlotState {
    fn claim(&self) -> Option<Arc<dyn ToolServerClient>> {
        let client = self.client.get()?;
        if self.released.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Arc::clone(client))
    }
}

type Slot = Arc<SlotState>;

/// Close `client`, logging instead of propagating the failure.
async fn close_quietly(key: &PoolKey, client: &dyn ToolServerClient) {
    match client.close().await {
        Ok(()) => debug!("Closed tool server client {}", key),
        Err(e) => warn!("Failed to close tool server client {}: {}", key, e),
    }
}

pub struct ConnectionPool {
    connector: Arc<dyn ToolServerConnector>,
    policy: RetryPolicy,
    slots: Mutex<HashMap<PoolKey, Slot>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn ToolServerConnector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Return the cached client for `server`, or establish one.
    pub async fn get_or_create(
        &self,
        server: &ToolServer,
        settings: Option<&ToolServerSettings>,
    ) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::PoolClosed);
        }

        let key = PoolKey::new(&server.meta.namespace, &server.meta.name);
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let client = slot
            .client
            .get_or_try_init(|| self.establish(&key, server, settings))
            .await?
            .clone();

        // Close raced with establishment: do not hand out an orphan, and
        // leave it alone if `close` already took it.
        if self.closed.load(Ordering::SeqCst) {
            if let Some(orphan) = slot.claim() {
                close_quietly(&key, orphan.as_ref()).await;
            }
            return Err(ConnectionError::PoolClosed);
        }

        Ok(client)
    }

    /// Number of established clients.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.client.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every pooled client.
    ///
    /// Idempotent. Individual close failures are collected and reported
    /// together after every client has been attempted.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained: Vec<(PoolKey, Slot)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let mut failures = Vec::new();
        for (key, slot) in drained {
            if let Some(client) = slot.claim() {
                if let Err(e) = client.close().await {
                    warn!("Failed to close tool server client {}: {}", key, e);
                    failures.push(format!("{}: {}", key, e));
                } else {
                    debug!("Closed tool server client {}", key);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConnectionError::CloseFailed(failures))
        }
    }

    async fn establish(
        &self,
        key: &PoolKey,
        server: &ToolServer,
        settings: Option<&ToolServerSettings>,
    ) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        let request = ConnectRequest {
            server: key.to_string(),
            endpoint: server.endpoint(),
            transport: server.transport,
            headers: merge_headers(&server.headers, settings.map(|s| &s.headers)),
            timeout: match server.transport {
                ToolServerTransport::Sse => None,
                ToolServerTransport::Http => Some(
                    server
                        .timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_SERVER_TIMEOUT),
                ),
            },
        };

        let client = self.connect_with_retry(&request).await?;

        if let Some(settings) = settings {
            for call in &settings.tool_calls {
                debug!("Running startup tool call {} on {}", call.name, key);
                if let Err(e) = client.call_tool(&call.name, call.arguments.clone()).await {
                    close_quietly(key, client.as_ref()).await;
                    return Err(ConnectionError::Protocol(format!(
                        "startup tool call {} failed on {}: {}",
                        call.name, key, e
                    )));
                }
            }
        }

        info!("Connected to tool server {} at {}", key, request.endpoint);
        Ok(client)
    }

    /// Attempt loop bounded by its own deadline, not by the caller's.
    async fn connect_with_retry(
        &self,
        request: &ConnectRequest,
    ) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        // An unrepresentable timeout means no deadline.
        let deadline = Instant::now().checked_add(self.policy.connect_timeout);
        let mut attempts = 0;
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                if deadline.is_some_and(|d| {
                    Instant::now().checked_add(delay).is_none_or(|wake| wake >= d)
                }) {
                    break;
                }
                debug!(
                    "Retrying {} in {:?} (attempt {}/{})",
                    request.server,
                    delay,
                    attempt + 1,
                    self.policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            attempts = attempt + 1;
            let connect = self.connector.connect(request);
            let outcome = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, connect).await,
                None => Ok(connect.await),
            };
            match outcome {
                Ok(Ok(client)) => return Ok(client),
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(
                        "Attempt {} to connect to {} failed: {}",
                        attempts, request.server, e
                    );
                    last_error = Some(e);
                }
                Ok(Err(e)) => {
                    warn!("Fatal error connecting to {}: {}", request.server, e);
                    return Err(e);
                }
                Err(_) => {
                    last_error = Some(ConnectionError::Timeout(format!(
                        "connection attempts exceeded {:?}",
                        self.policy.connect_timeout
                    )));
                    break;
                }
            }
        }

        Err(ConnectionError::Exhausted {
            server: request.server.clone(),
            attempts,
            source: Box::new(last_error.unwrap_or_else(|| {
                ConnectionError::Timeout(format!(
                    "connection attempts exceeded {:?}",
                    self.policy.connect_timeout
                ))
            })),
        })
    }
}

/// Server headers first; per-call overrides win.
fn merge_headers(
    server: &BTreeMap<String, String>,
    overrides: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged = server.clone();
    if let Some(overrides) = overrides {
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
