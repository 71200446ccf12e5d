//! In-process resource store

use super::manifest::Manifest;
use async_trait::async_trait;
use conductor_application::ports::resource_store::{ResourceStore, StoreError};
use conductor_domain::{
    Agent, LabelSelector, MemoryResource, ModelResource, ObjectMeta, Query, QueryKey, QueryStatus,
    Team, ToolResource, ToolServer,
};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

type Key = (String, String);

fn key(meta: &ObjectMeta) -> Key {
    (meta.namespace.clone(), meta.name.clone())
}

/// One collection, ordered by namespace then name.
struct Collection<T> {
    kind: &'static str,
    items: RwLock<BTreeMap<Key, T>>,
}

impl<T: Clone> Collection<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: RwLock::new(BTreeMap::new()),
        }
    }

    fn insert(&self, key: Key, item: T) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, item);
    }

    fn get(&self, namespace: &str, name: &str) -> Result<T, StoreError> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(self.kind, namespace, name))
    }

    fn list(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
        meta: impl Fn(&T) -> &ObjectMeta,
    ) -> Vec<T> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, item)| item)
            .filter(|item| selector.is_none_or(|s| s.matches(&meta(item).labels)))
            .cloned()
            .collect()
    }
}

pub struct InMemoryResourceStore {
    queries: RwLock<BTreeMap<QueryKey, Query>>,
    agents: Collection<Agent>,
    teams: Collection<Team>,
    models: Collection<ModelResource>,
    tools: Collection<ToolResource>,
    tool_servers: Collection<ToolServer>,
    memories: Collection<MemoryResource>,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self {
            queries: RwLock::new(BTreeMap::new()),
            agents: Collection::new("agent"),
            teams: Collection::new("team"),
            models: Collection::new("model"),
            tools: Collection::new("tool"),
            tool_servers: Collection::new("tool server"),
            memories: Collection::new("memory"),
        }
    }
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every resource and query of a validated manifest.
    pub fn from_manifest(manifest: Manifest) -> Self {
        let store = Self::new();
        info!(
            agents = manifest.agents.len(),
            teams = manifest.teams.len(),
            models = manifest.models.len(),
            tools = manifest.tools.len(),
            queries = manifest.queries.len(),
            "Loading manifest"
        );

        for agent in manifest.agents {
            store.insert_agent(agent);
        }
        for team in manifest.teams {
            store.insert_team(team);
        }
        for model in manifest.models {
            store.insert_model(model);
        }
        for tool in manifest.tools {
            store.insert_tool(tool);
        }
        for server in manifest.tool_servers {
            store.insert_tool_server(server);
        }
        for memory in manifest.memories {
            store.insert_memory(memory);
        }
        for query in manifest.queries {
            store.insert_query(query.into_query());
        }
        store
    }

    pub fn insert_agent(&self, agent: Agent) {
        self.agents.insert(key(&agent.meta), agent);
    }

    pub fn insert_team(&self, team: Team) {
        self.teams.insert(key(&team.meta), team);
    }

    pub fn insert_model(&self, model: ModelResource) {
        self.models.insert(key(&model.meta), model);
    }

    pub fn insert_tool(&self, tool: ToolResource) {
        self.tools.insert(key(&tool.meta), tool);
    }

    pub fn insert_tool_server(&self, server: ToolServer) {
        self.tool_servers.insert(key(&server.meta), server);
    }

    pub fn insert_memory(&self, memory: MemoryResource) {
        self.memories.insert(key(&memory.meta), memory);
    }

    pub fn insert_query(&self, query: Query) {
        self.queries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.key.clone(), query);
    }

    pub fn query_keys(&self) -> Vec<QueryKey> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Every model resource across namespaces.
    pub fn all_models(&self) -> Vec<ModelResource> {
        self.models
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get_query(&self, key: &QueryKey) -> Result<Option<Query>, StoreError> {
        Ok(self
            .queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn put_query(&self, query: Query) -> Result<(), StoreError> {
        self.insert_query(query);
        Ok(())
    }

    async fn delete_query(&self, key: &QueryKey) -> Result<(), StoreError> {
        self.queries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn update_query_status(
        &self,
        key: &QueryKey,
        status: QueryStatus,
    ) -> Result<(), StoreError> {
        let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
        let query = queries
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found("query", &key.namespace, &key.name))?;
        if query.status != status {
            debug!(query = %key, phase = %status.phase, "Updating query status");
            query.status = status;
        }
        Ok(())
    }

    async fn get_agent(&self, namespace: &str, name: &str) -> Result<Agent, StoreError> {
        self.agents.get(namespace, name)
    }

    async fn list_agents(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Agent>, StoreError> {
        Ok(self.agents.list(namespace, selector, |a| &a.meta))
    }

    async fn get_team(&self, namespace: &str, name: &str) -> Result<Team, StoreError> {
        self.teams.get(namespace, name)
    }

    async fn list_teams(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Team>, StoreError> {
        Ok(self.teams.list(namespace, selector, |t| &t.meta))
    }

    async fn get_model(&self, namespace: &str, name: &str) -> Result<ModelResource, StoreError> {
        self.models.get(namespace, name)
    }

    async fn list_models(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<ModelResource>, StoreError> {
        Ok(self.models.list(namespace, selector, |m| &m.meta))
    }

    async fn get_tool(&self, namespace: &str, name: &str) -> Result<ToolResource, StoreError> {
        self.tools.get(namespace, name)
    }

    async fn list_tools(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<ToolResource>, StoreError> {
        Ok(self.tools.list(namespace, selector, |t| &t.meta))
    }

    async fn get_tool_server(&self, namespace: &str, name: &str) -> Result<ToolServer, StoreError> {
        self.tool_servers.get(namespace, name)
    }

    async fn get_memory(&self, namespace: &str, name: &str) -> Result<MemoryResource, StoreError> {
        self.memories.get(namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::{Message, QueryPhase};

    fn agent(namespace: &str, name: &str, team: &str) -> Agent {
        Agent {
            meta: ObjectMeta::new(namespace, name).with_label("team", team),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_selector() {
        let store = InMemoryResourceStore::new();
        store.insert_agent(agent("default", "b", "blue"));
        store.insert_agent(agent("default", "a", "red"));
        store.insert_agent(agent("other", "c", "red"));

        let all = store.list_agents("default", None).await.unwrap();
        let names: Vec<_> = all.iter().map(|a| a.meta.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let selector = LabelSelector::default().with_label("team", "red");
        let red = store.list_agents("default", Some(&selector)).await.unwrap();
        assert_eq!(red.len(), 1);
        assert_eq!(red[0].meta.name, "a");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryResourceStore::new();
        let err = store.get_model("default", "gpt").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "model default/gpt not found");
    }

    #[tokio::test]
    async fn test_status_update_requires_query() {
        let store = InMemoryResourceStore::new();
        let key = QueryKey::new("default", "q1");
        let status = QueryStatus {
            phase: QueryPhase::Running,
            ..Default::default()
        };
        assert!(
            store
                .update_query_status(&key, status.clone())
                .await
                .unwrap_err()
                .is_not_found()
        );

        store.insert_query(Query::new(key.clone(), vec![Message::user("hi")]));
        store.update_query_status(&key, status.clone()).await.unwrap();
        store.update_query_status(&key, status).await.unwrap();
        let query = store.get_query(&key).await.unwrap().unwrap();
        assert_eq!(query.status.phase, QueryPhase::Running);

        store.delete_query(&key).await.unwrap();
        assert!(store.get_query(&key).await.unwrap().is_none());
    }
}
