//! In-memory port implementations shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use conductor_application::ports::event_stream::{
    ChunkSink, EventStream, EventStreamFactory, SinkError,
};
use conductor_application::ports::memory::{Memory, MemoryError, MemoryFactory};
use conductor_application::ports::resource_store::{ResourceStore, StoreError};
use conductor_application::ports::tool_server::{
    ConnectRequest, ToolBackends, ToolServerClient, ToolServerConnector,
};
use conductor_application::{
    ChatProvider, ConnectionError, ExecutionServices, ProviderError, ProviderFactory,
    QueryOrchestrator, ToolExecutor, ToolFailure,
};
use conductor_domain::{
    Agent, Choice, Chunk, Completion, FinishReason, HttpToolSpec, LabelSelector, Message,
    MemoryResource, ModelResource, ObjectMeta, Query, QueryKey, QueryStatus, Team, TargetKind,
    TokenUsage, ToolCall, ToolDefinition, ToolKind, ToolResource, ToolResult, ToolServer,
    ToolSpec,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const NS: &str = "default";

// -- Resource store -----------------------------------------------------------

#[derive(Default)]
pub struct MemStore {
    pub queries: Mutex<HashMap<QueryKey, Query>>,
    pub agents: Mutex<Vec<Agent>>,
    pub teams: Mutex<Vec<Team>>,
    pub models: Mutex<Vec<ModelResource>>,
    pub tools: Mutex<Vec<ToolResource>>,
    /// Every status written, in order.
    pub status_writes: Mutex<Vec<(QueryKey, QueryStatus)>>,
    /// Listing this collection fails.
    pub failing_list: Mutex<Option<TargetKind>>,
}

impl MemStore {
    pub fn with_query(&self, query: Query) {
        self.queries.lock().unwrap().insert(query.key.clone(), query);
    }

    pub fn query(&self, key: &QueryKey) -> Option<Query> {
        self.queries.lock().unwrap().get(key).cloned()
    }

    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        self.query(key).map(|q| q.status).unwrap_or_default()
    }

    pub fn request_cancel(&self, key: &QueryKey) {
        if let Some(query) = self.queries.lock().unwrap().get_mut(key) {
            query.cancel = true;
        }
    }

    pub fn writes_for(&self, key: &QueryKey) -> usize {
        self.status_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    fn check_list(&self, kind: TargetKind) -> Result<(), StoreError> {
        if *self.failing_list.lock().unwrap() == Some(kind) {
            return Err(StoreError::Backend(format!("cannot list {}s", kind)));
        }
        Ok(())
    }
}

fn selected<T: Clone>(
    items: &[T],
    meta: impl Fn(&T) -> &ObjectMeta,
    namespace: &str,
    selector: Option<&LabelSelector>,
) -> Vec<T> {
    items
        .iter()
        .filter(|item| meta(item).namespace == namespace)
        .filter(|item| selector.is_none_or(|s| s.matches(&meta(item).labels)))
        .cloned()
        .collect()
}

fn find<T: Clone>(
    items: &[T],
    meta: impl Fn(&T) -> &ObjectMeta,
    kind: &'static str,
    namespace: &str,
    name: &str,
) -> Result<T, StoreError> {
    items
        .iter()
        .find(|item| meta(item).namespace == namespace && meta(item).name == name)
        .cloned()
        .ok_or_else(|| StoreError::not_found(kind, namespace, name))
}

#[async_trait]
impl ResourceStore for MemStore {
    async fn get_query(&self, key: &QueryKey) -> Result<Option<Query>, StoreError> {
        Ok(self.query(key))
    }

    async fn put_query(&self, query: Query) -> Result<(), StoreError> {
        self.with_query(query);
        Ok(())
    }

    async fn delete_query(&self, key: &QueryKey) -> Result<(), StoreError> {
        self.queries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn update_query_status(
        &self,
        key: &QueryKey,
        status: QueryStatus,
    ) -> Result<(), StoreError> {
        let mut queries = self.queries.lock().unwrap();
        let query = queries
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found("query", &key.namespace, &key.name))?;
        query.status = status.clone();
        self.status_writes
            .lock()
            .unwrap()
            .push((key.clone(), status));
        Ok(())
    }

    async fn get_agent(&self, ns: &str, name: &str) -> Result<Agent, StoreError> {
        find(&self.agents.lock().unwrap(), |a| &a.meta, "agent", ns, name)
    }

    async fn list_agents(
        &self,
        ns: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Agent>, StoreError> {
        self.check_list(TargetKind::Agent)?;
        Ok(selected(&self.agents.lock().unwrap(), |a| &a.meta, ns, selector))
    }

    async fn get_team(&self, ns: &str, name: &str) -> Result<Team, StoreError> {
        find(&self.teams.lock().unwrap(), |t| &t.meta, "team", ns, name)
    }

    async fn list_teams(
        &self,
        ns: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Team>, StoreError> {
        self.check_list(TargetKind::Team)?;
        Ok(selected(&self.teams.lock().unwrap(), |t| &t.meta, ns, selector))
    }

    async fn get_model(&self, ns: &str, name: &str) -> Result<ModelResource, StoreError> {
        find(&self.models.lock().unwrap(), |m| &m.meta, "model", ns, name)
    }

    async fn list_models(
        &self,
        ns: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<ModelResource>, StoreError> {
        self.check_list(TargetKind::Model)?;
        Ok(selected(&self.models.lock().unwrap(), |m| &m.meta, ns, selector))
    }

    async fn get_tool(&self, ns: &str, name: &str) -> Result<ToolResource, StoreError> {
        find(&self.tools.lock().unwrap(), |t| &t.meta, "tool", ns, name)
    }

    async fn list_tools(
        &self,
        ns: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<ToolResource>, StoreError> {
        self.check_list(TargetKind::Tool)?;
        Ok(selected(&self.tools.lock().unwrap(), |t| &t.meta, ns, selector))
    }

    async fn get_tool_server(&self, ns: &str, name: &str) -> Result<ToolServer, StoreError> {
        Err(StoreError::not_found("tool server", ns, name))
    }

    async fn get_memory(&self, ns: &str, name: &str) -> Result<MemoryResource, StoreError> {
        Err(StoreError::not_found("memory", ns, name))
    }
}

// -- Resources ----------------------------------------------------------------

pub fn model(name: &str) -> ModelResource {
    ModelResource {
        meta: ObjectMeta::new(NS, name),
        provider: Default::default(),
        model: format!("{}-model", name),
        base_url: "http://models.invalid/v1".to_string(),
        api_key: None,
        api_version: None,
        properties: Default::default(),
    }
}

pub fn agent(name: &str, tools: &[&str]) -> Agent {
    Agent {
        meta: ObjectMeta::new(NS, name),
        prompt: format!("You are {}.", name),
        tools: tools
            .iter()
            .map(|t| conductor_domain::AgentToolRef::custom(*t))
            .collect(),
        ..Default::default()
    }
}

pub fn http_tool(name: &str) -> ToolResource {
    ToolResource {
        meta: ObjectMeta::new(NS, name),
        description: format!("{} lookup", name),
        input_schema: Some(serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"],
        })),
        spec: ToolSpec::Http(HttpToolSpec {
            url: format!("http://tools.invalid/{}", name),
            method: "GET".to_string(),
            headers: Default::default(),
            body: None,
            timeout_secs: None,
        }),
    }
}

pub fn key(name: &str) -> QueryKey {
    QueryKey::new(NS, name)
}

// -- Completions --------------------------------------------------------------

pub fn text_reply(text: &str) -> Completion {
    Completion {
        id: "resp".to_string(),
        model: "scripted".to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(text),
            finish_reason: FinishReason::Stop,
        }],
        usage: TokenUsage::new(10, 5),
    }
}

pub fn tool_reply(id: &str, name: &str, arguments: &str) -> Completion {
    Completion {
        id: "resp".to_string(),
        model: "scripted".to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new(id, name, arguments)],
            ),
            finish_reason: FinishReason::ToolCalls,
        }],
        usage: TokenUsage::new(10, 5),
    }
}

// -- Provider -----------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Completion>>,
    /// Calls block until notified.
    gate: Option<Arc<Notify>>,
    /// Calls never return.
    hang: bool,
    panic: bool,
    pub calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Completion>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn gated(replies: Vec<Completion>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(replies)
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("provider exploded");
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".to_string()))
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat_completion(
        &self,
        _messages: &[Message],
        _n: u32,
        _tools: &[ToolDefinition],
    ) -> Result<Completion, ProviderError> {
        self.next().await
    }

    async fn chat_completion_stream(
        &self,
        _messages: &[Message],
        _n: u32,
        _tools: &[ToolDefinition],
        sink: &dyn ChunkSink,
    ) -> Result<Completion, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let completion = self.next().await?;
        for chunk in Chunk::synthesize_from(&completion) {
            sink.on_chunk(&chunk).await?;
        }
        Ok(completion)
    }
}

/// Resolves providers by model resource name.
#[derive(Default)]
pub struct Providers(pub Mutex<HashMap<String, Arc<ScriptedProvider>>>);

impl Providers {
    pub fn with(self, model: &str, provider: Arc<ScriptedProvider>) -> Self {
        self.0.lock().unwrap().insert(model.to_string(), provider);
        self
    }
}

impl ProviderFactory for Providers {
    fn create(&self, model: &ModelResource) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        self.0
            .lock()
            .unwrap()
            .get(&model.meta.name)
            .cloned()
            .map(|p| p as Arc<dyn ChatProvider>)
            .ok_or_else(|| ProviderError::Configuration(format!("no provider for {}", model.meta.name)))
    }
}

// -- Memory -------------------------------------------------------------------

pub struct RecordingMemory {
    pub history: Vec<Message>,
    pub appends: Mutex<Vec<(String, Vec<Message>)>>,
}

impl RecordingMemory {
    pub fn new(history: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            history,
            appends: Mutex::new(Vec::new()),
        })
    }

    pub fn appends(&self) -> Vec<(String, Vec<Message>)> {
        self.appends.lock().unwrap().clone()
    }
}

#[async_trait]
impl Memory for RecordingMemory {
    fn conversation_id(&self) -> Option<String> {
        Some("conv-1".to_string())
    }

    async fn get_messages(&self) -> Result<Vec<Message>, MemoryError> {
        Ok(self.history.clone())
    }

    async fn add_messages(&self, query_id: &str, messages: &[Message]) -> Result<(), MemoryError> {
        self.appends
            .lock()
            .unwrap()
            .push((query_id.to_string(), messages.to_vec()));
        Ok(())
    }
}

pub struct Memories(pub Arc<RecordingMemory>);

#[async_trait]
impl MemoryFactory for Memories {
    async fn for_query(&self, _query: &Query) -> Result<Arc<dyn Memory>, MemoryError> {
        Ok(Arc::clone(&self.0) as Arc<dyn Memory>)
    }
}

pub struct UnreachableMemory;

#[async_trait]
impl MemoryFactory for UnreachableMemory {
    async fn for_query(&self, _query: &Query) -> Result<Arc<dyn Memory>, MemoryError> {
        Err(MemoryError::Unreachable("connection refused".to_string()))
    }
}

/// Panics on the first lookup, then hands out the wrapped memory.
pub struct PanicOnceMemory {
    pub memory: Arc<RecordingMemory>,
    pub panicked: AtomicBool,
}

impl PanicOnceMemory {
    pub fn new(memory: Arc<RecordingMemory>) -> Self {
        Self {
            memory,
            panicked: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MemoryFactory for PanicOnceMemory {
    async fn for_query(&self, _query: &Query) -> Result<Arc<dyn Memory>, MemoryError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("memory backend exploded");
        }
        Ok(Arc::clone(&self.memory) as Arc<dyn Memory>)
    }
}

// -- Event stream -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(Chunk),
    Completed,
    Closed,
}

#[derive(Default)]
pub struct RecordingStream {
    pub events: Mutex<Vec<StreamEvent>>,
}

impl RecordingStream {
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChunkSink for RecordingStream {
    async fn on_chunk(&self, chunk: &Chunk) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap()
            .push(StreamEvent::Chunk(chunk.clone()));
        Ok(())
    }
}

#[async_trait]
impl EventStream for RecordingStream {
    async fn notify_completion(&self) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(StreamEvent::Completed);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(StreamEvent::Closed);
        Ok(())
    }
}

pub struct Streams(pub Arc<RecordingStream>);

#[async_trait]
impl EventStreamFactory for Streams {
    async fn create(&self, _query: &Query) -> Result<Arc<dyn EventStream>, SinkError> {
        Ok(Arc::clone(&self.0) as Arc<dyn EventStream>)
    }
}

// -- Tool backends ------------------------------------------------------------

/// HTTP tool stand-in answering with the call's arguments.
pub struct EchoHttp;

#[async_trait]
impl ToolExecutor for EchoHttp {
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolFailure> {
        Ok(ToolResult::success(
            &call.id,
            &call.name,
            format!("{} => {}", call.name, call.arguments),
        ))
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Http
    }
}

pub struct NoServers;

#[async_trait]
impl ToolServerConnector for NoServers {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        Err(ConnectionError::Protocol(format!(
            "no tool server at {}",
            request.endpoint
        )))
    }
}

pub struct Backends;

impl ToolBackends for Backends {
    fn http_executor(&self, _tool: &ToolResource, _spec: &HttpToolSpec) -> Arc<dyn ToolExecutor> {
        Arc::new(EchoHttp)
    }

    fn connector(&self) -> Arc<dyn ToolServerConnector> {
        Arc::new(NoServers)
    }
}

// -- Wiring -------------------------------------------------------------------

pub fn services(store: &Arc<MemStore>, providers: Providers) -> ExecutionServices {
    ExecutionServices::new(
        Arc::clone(store) as Arc<dyn ResourceStore>,
        Arc::new(providers),
        Arc::new(Backends),
    )
}

/// Reconcile until an execution is started or the query settles.
pub async fn admit(orchestrator: &QueryOrchestrator, key: &QueryKey) {
    loop {
        let action = orchestrator.reconcile(key).await.unwrap();
        if !action.requeue() {
            return;
        }
    }
}

/// Admit the query and wait for its execution to finish.
pub async fn run_to_completion(orchestrator: &QueryOrchestrator, key: &QueryKey) {
    admit(orchestrator, key).await;
    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait(key))
        .await
        .expect("query did not finish");
}

/// Yield until `provider` has been called `n` times.
pub async fn until_called(provider: &ScriptedProvider, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.calls() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("provider was not called");
}
