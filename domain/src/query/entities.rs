//! Query, target and response entities.

use super::selector::LabelSelector;
use crate::completion::TokenUsage;
use crate::core::error::DomainError;
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Identity of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub namespace: String,
    pub name: String,
}

impl QueryKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Agent,
    Team,
    Model,
    Tool,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Agent => "agent",
            TargetKind::Team => "team",
            TargetKind::Model => "model",
            TargetKind::Tool => "tool",
        }
    }
}

impl FromStr for TargetKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(TargetKind::Agent),
            "team" => Ok(TargetKind::Team),
            "model" => Ok(TargetKind::Model),
            "tool" => Ok(TargetKind::Tool),
            other => Err(DomainError::InvalidTargetKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressable execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub name: String,
}

impl Target {
    pub fn new(kind: TargetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::new(TargetKind::Agent, name)
    }

    pub fn team(name: impl Into<String>) -> Self {
        Self::new(TargetKind::Team, name)
    }

    pub fn model(name: impl Into<String>) -> Self {
        Self::new(TargetKind::Model, name)
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::new(TargetKind::Tool, name)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Lifecycle phase of a query.
///
/// ```text
/// Unstarted -> Pending -> Running -> Done | Error | Canceled
///        \________\__________\______________________/ (cancel)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPhase {
    #[default]
    Unstarted,
    Pending,
    Running,
    Done,
    Error,
    Canceled,
}

impl QueryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPhase::Unstarted => "unstarted",
            QueryPhase::Pending => "pending",
            QueryPhase::Running => "running",
            QueryPhase::Done => "done",
            QueryPhase::Error => "error",
            QueryPhase::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryPhase::Done | QueryPhase::Error | QueryPhase::Canceled
        )
    }

    /// Forward-only transitions, plus cancel from any non-terminal phase.
    pub fn can_transition_to(&self, next: QueryPhase) -> bool {
        use QueryPhase::*;
        match (self, next) {
            (from, Canceled) => !from.is_terminal(),
            (Unstarted, Pending) | (Pending, Running) => true,
            // Setup failures may surface before the query ever ran
            (Unstarted | Pending, Error) => true,
            (Running, Done | Error) => true,
            _ => false,
        }
    }

    pub fn transition(&self, next: QueryPhase) -> Result<QueryPhase, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePhase {
    Done,
    Error,
}

/// Result of one target execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResponse {
    pub target: Target,
    pub content: String,
    /// Serialized message array (or error payload) of the execution.
    pub raw: String,
    pub phase: ResponsePhase,
}

impl TargetResponse {
    pub fn success(target: Target, messages: &[Message]) -> Self {
        let content = messages
            .last()
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        let raw = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
        Self {
            target,
            content,
            raw,
            phase: ResponsePhase::Done,
        }
    }

    pub fn error(target: Target, message: impl Into<String>) -> Self {
        let message = message.into();
        let raw = serde_json::json!([{
            "error": "target_execution_error",
            "message": message,
        }])
        .to_string();
        Self {
            target,
            content: message,
            raw,
            phase: ResponsePhase::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.phase == ResponsePhase::Error
    }
}

/// Observed state of a query, written only by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStatus {
    pub phase: QueryPhase,
    #[serde(default)]
    pub responses: Vec<TargetResponse>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl QueryStatus {
    /// Overall phase and top-level message for a set of responses.
    ///
    /// Any error response makes the query an error; the first one found
    /// becomes the top-level message.
    pub fn outcome(responses: &[TargetResponse]) -> (QueryPhase, Option<String>) {
        match responses.iter().find(|r| r.is_error()) {
            Some(first) if !first.content.is_empty() => {
                (QueryPhase::Error, Some(first.content.clone()))
            }
            Some(_) => (
                QueryPhase::Error,
                Some("Query completed with error".to_string()),
            ),
            None => (QueryPhase::Done, None),
        }
    }
}

/// A request to execute one or more targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub key: QueryKey,
    pub input: Vec<Message>,
    pub targets: Vec<Target>,
    pub selector: Option<LabelSelector>,
    pub session_id: Option<String>,
    pub conversation_id: Option<String>,
    /// Memory resource to use; `None` selects the engine default.
    pub memory: Option<String>,
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub cancel: bool,
    pub streaming: bool,
    pub created_at: DateTime<Utc>,
    pub status: QueryStatus,
}

impl Query {
    pub fn new(key: QueryKey, input: Vec<Message>) -> Self {
        Self {
            key,
            input,
            targets: Vec::new(),
            selector: None,
            session_id: None,
            conversation_id: None,
            memory: None,
            ttl: None,
            timeout: None,
            cancel: false,
            streaming: false,
            created_at: Utc::now(),
            status: QueryStatus::default(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Session id, defaulting to the query identity.
    pub fn effective_session_id(&self) -> String {
        self.session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.key.to_string())
    }

    /// Whether the TTL has run out at `now`. A TTL too large to add to
    /// the creation time never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .is_some_and(|expiry| expiry <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions_are_monotonic() {
        use QueryPhase::*;
        assert!(Unstarted.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Done));
        assert!(Running.can_transition_to(Error));
        assert!(Pending.can_transition_to(Error));
        assert!(!Done.can_transition_to(Running));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Error.can_transition_to(Done));
    }

    #[test]
    fn test_cancel_only_from_non_terminal() {
        use QueryPhase::*;
        assert!(Unstarted.can_transition_to(Canceled));
        assert!(Running.can_transition_to(Canceled));
        assert!(!Done.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Canceled));
        assert!(Done.transition(Canceled).is_err());
    }

    #[test]
    fn test_success_response_uses_last_message() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let response = TargetResponse::success(Target::agent("a1"), &messages);
        assert_eq!(response.content, "hello");
        assert_eq!(response.phase, ResponsePhase::Done);
        let raw: Vec<Message> = serde_json::from_str(&response.raw).unwrap();
        assert_eq!(raw, messages);
    }

    #[test]
    fn test_error_response_payload() {
        let response = TargetResponse::error(Target::model("m"), "boom");
        let raw: serde_json::Value = serde_json::from_str(&response.raw).unwrap();
        assert_eq!(raw[0]["error"], "target_execution_error");
        assert_eq!(raw[0]["message"], "boom");
        assert!(response.is_error());
    }

    #[test]
    fn test_outcome_surfaces_first_error() {
        let responses = vec![
            TargetResponse::success(Target::agent("a"), &[Message::assistant("ok")]),
            TargetResponse::error(Target::agent("b"), "first failure"),
            TargetResponse::error(Target::agent("c"), "second failure"),
        ];
        let (phase, message) = QueryStatus::outcome(&responses);
        assert_eq!(phase, QueryPhase::Error);
        assert_eq!(message.as_deref(), Some("first failure"));

        let (phase, message) = QueryStatus::outcome(&responses[..1]);
        assert_eq!(phase, QueryPhase::Done);
        assert!(message.is_none());
    }

    #[test]
    fn test_outcome_falls_back_for_empty_error_text() {
        let responses = vec![TargetResponse::error(Target::tool("t"), "")];
        let (_, message) = QueryStatus::outcome(&responses);
        assert_eq!(message.as_deref(), Some("Query completed with error"));
    }

    #[test]
    fn test_session_id_defaults_to_key() {
        let query = Query::new(QueryKey::new("default", "q1"), vec![]);
        assert_eq!(query.effective_session_id(), "default/q1");
    }

    #[test]
    fn test_expiry() {
        let mut query = Query::new(QueryKey::new("default", "q1"), vec![]);
        assert!(!query.is_expired(Utc::now()));
        query.ttl = Some(Duration::from_secs(60));
        assert!(!query.is_expired(query.created_at));
        assert!(query.is_expired(query.created_at + chrono::Duration::seconds(61)));
        query.ttl = Some(Duration::MAX);
        assert!(!query.is_expired(query.created_at + chrono::Duration::days(365)));
    }

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("team".parse::<TargetKind>().unwrap(), TargetKind::Team);
        assert!("pipeline".parse::<TargetKind>().is_err());
    }
}
