//! Resource store port
//!
//! The declarative store is an external collaborator. The engine reads
//! agents, teams, models, tools and tool servers from it and writes query
//! status through the dedicated, idempotent status operation.

use async_trait::async_trait;
use conductor_domain::{
    Agent, LabelSelector, MemoryResource, ModelResource, Query, QueryKey, QueryStatus, Team,
    ToolResource, ToolServer,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("Resource store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `Ok(None)` when the query no longer exists.
    async fn get_query(&self, key: &QueryKey) -> Result<Option<Query>, StoreError>;

    async fn put_query(&self, query: Query) -> Result<(), StoreError>;

    async fn delete_query(&self, key: &QueryKey) -> Result<(), StoreError>;

    /// Replace the status of a query. Writing the same status twice is a no-op.
    async fn update_query_status(&self, key: &QueryKey, status: QueryStatus)
    -> Result<(), StoreError>;

    async fn get_agent(&self, namespace: &str, name: &str) -> Result<Agent, StoreError>;

    async fn list_agents(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Agent>, StoreError>;

    async fn get_team(&self, namespace: &str, name: &str) -> Result<Team, StoreError>;

    async fn list_teams(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Team>, StoreError>;

    async fn get_model(&self, namespace: &str, name: &str) -> Result<ModelResource, StoreError>;

    async fn list_models(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<ModelResource>, StoreError>;

    async fn get_tool(&self, namespace: &str, name: &str) -> Result<ToolResource, StoreError>;

    async fn list_tools(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<ToolResource>, StoreError>;

    async fn get_tool_server(&self, namespace: &str, name: &str) -> Result<ToolServer, StoreError>;

    async fn get_memory(&self, namespace: &str, name: &str) -> Result<MemoryResource, StoreError>;
}
