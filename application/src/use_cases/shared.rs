//! Shared utilities for use cases.
//!
//! Contains the [`ExecutionServices`] bundle handed to every runner, the
//! [`ExecutionScope`] every blocking call of a query's execution runs
//! under, and the message-preparation helpers shared by the agent, team
//! and model paths.

use crate::config::{ExecutionParams, RetryPolicy};
use crate::ports::chat_provider::ProviderFactory;
use crate::ports::resource_store::ResourceStore;
use crate::ports::telemetry::{NoopTelemetry, Telemetry};
use crate::ports::tool_server::ToolBackends;
use crate::use_cases::dispatch::DispatchError;
use conductor_domain::Message;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Collaborators and static parameters shared by every execution path.
#[derive(Clone)]
pub struct ExecutionServices {
    pub store: Arc<dyn ResourceStore>,
    pub providers: Arc<dyn ProviderFactory>,
    pub tools: Arc<dyn ToolBackends>,
    pub telemetry: Arc<dyn Telemetry>,
    pub params: ExecutionParams,
    pub retry: RetryPolicy,
}

impl ExecutionServices {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        providers: Arc<dyn ProviderFactory>,
        tools: Arc<dyn ToolBackends>,
    ) -> Self {
        Self {
            store,
            providers,
            tools,
            telemetry: Arc::new(NoopTelemetry),
            params: ExecutionParams::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_params(mut self, params: ExecutionParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Cancellation and deadline governing one target execution.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl ExecutionScope {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            timeout: None,
        }
    }

    /// Child scope that also expires after `timeout`.
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(inherited), Some(own)) => Some(inherited.min(own)),
            (inherited, own) => inherited.or(own),
        };
        Self {
            token: self.token.clone(),
            deadline,
            timeout: Some(timeout),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Return `Err(DispatchError::Cancelled)` if the scope was cancelled.
    pub fn check(&self) -> Result<(), DispatchError> {
        if self.token.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(self.timed_out());
        }
        Ok(())
    }

    /// Run `fut` until it completes, the scope is cancelled, or the
    /// deadline passes, whichever comes first.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<DispatchError>,
    {
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DispatchError::Cancelled),
            _ = expiry => Err(self.timed_out()),
            result = fut => result.map_err(Into::into),
        }
    }

    fn timed_out(&self) -> DispatchError {
        DispatchError::Timeout(self.timeout.unwrap_or_default())
    }
}

/// Split query input against stored history: the last input message is
/// the current one, everything before it extends the history.
pub(crate) fn prepare_execution_messages(
    input: &[Message],
    history: Vec<Message>,
) -> Result<(Message, Vec<Message>), DispatchError> {
    let (current, earlier) = conductor_domain::message::split_current(input)
        .ok_or(DispatchError::NoInput)?;
    let mut context = history;
    context.extend_from_slice(earlier);
    Ok((current.clone(), context))
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Input followed by produced messages, as persisted to memory.
pub(crate) fn messages_for_memory(input: &[Message], output: &[Message]) -> Vec<Message> {
    input.iter().chain(output).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let scope = ExecutionScope::new(CancellationToken::new()).with_timeout(Duration::from_secs(5));
        let result: Result<(), DispatchError> = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DispatchError>(())
            })
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout(t)) if t == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_keeps_inherited_deadline() {
        let unbounded = ExecutionScope::new(CancellationToken::new()).with_timeout(Duration::MAX);
        assert!(unbounded.check().is_ok());
        let result: Result<u8, DispatchError> = unbounded.run(async { Ok::<_, DispatchError>(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let nested = ExecutionScope::new(CancellationToken::new())
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::MAX);
        let result: Result<(), DispatchError> = nested
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DispatchError>(())
            })
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let token = CancellationToken::new();
        let scope = ExecutionScope::new(token.clone());
        token.cancel();
        let result: Result<(), DispatchError> = scope
            .run(std::future::pending::<Result<(), DispatchError>>())
            .await;
        assert!(matches!(result, Err(DispatchError::Cancelled)));
        assert!(matches!(scope.check(), Err(DispatchError::Cancelled)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_prepare_execution_messages() {
        let input = vec![Message::user("first"), Message::user("second")];
        let (current, context) =
            prepare_execution_messages(&input, vec![Message::assistant("earlier")]).unwrap();
        assert_eq!(current, Message::user("second"));
        assert_eq!(context, vec![Message::assistant("earlier"), Message::user("first")]);

        assert!(matches!(
            prepare_execution_messages(&[], vec![]),
            Err(DispatchError::NoInput)
        ));
    }
}
