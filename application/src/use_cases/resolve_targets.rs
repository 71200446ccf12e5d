//! Target resolver
//!
//! Expands a query into its concrete target list: explicit targets first,
//! then every agent, team, model and tool in the query's namespace whose
//! labels match the selector. Duplicates are kept; each one is an
//! independent execution.

use crate::ports::resource_store::{ResourceStore, StoreError};
use conductor_domain::{DomainError, LabelSelector, Query, Target, TargetKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] DomainError),

    #[error("failed to list {kind}s: {source}")]
    List {
        kind: TargetKind,
        #[source]
        source: StoreError,
    },
}

pub struct TargetResolver {
    store: Arc<dyn ResourceStore>,
}

impl TargetResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Resolve the query's targets. Any listing failure aborts resolution.
    pub async fn resolve(&self, query: &Query) -> Result<Vec<Target>, ResolveError> {
        let mut targets = query.targets.clone();

        if let Some(selector) = &query.selector {
            let selected = self.resolve_selector(selector, &query.key.namespace).await?;
            targets.extend(selected);
        }

        info!("Resolved {} target(s) for query {}", targets.len(), query.key);
        Ok(targets)
    }

    async fn resolve_selector(
        &self,
        selector: &LabelSelector,
        namespace: &str,
    ) -> Result<Vec<Target>, ResolveError> {
        selector.validate()?;
        let mut targets = Vec::new();

        let agents = self
            .store
            .list_agents(namespace, Some(selector))
            .await
            .map_err(list_failed(TargetKind::Agent))?;
        targets.extend(agents.into_iter().map(|a| Target::agent(a.meta.name)));

        let teams = self
            .store
            .list_teams(namespace, Some(selector))
            .await
            .map_err(list_failed(TargetKind::Team))?;
        targets.extend(teams.into_iter().map(|t| Target::team(t.meta.name)));

        let models = self
            .store
            .list_models(namespace, Some(selector))
            .await
            .map_err(list_failed(TargetKind::Model))?;
        targets.extend(models.into_iter().map(|m| Target::model(m.meta.name)));

        let tools = self
            .store
            .list_tools(namespace, Some(selector))
            .await
            .map_err(list_failed(TargetKind::Tool))?;
        targets.extend(tools.into_iter().map(|t| Target::tool(t.meta.name)));

        debug!("Selector matched {} target(s) in {}", targets.len(), namespace);
        Ok(targets)
    }
}

fn list_failed(kind: TargetKind) -> impl FnOnce(StoreError) -> ResolveError {
    move |source| ResolveError::List { kind, source }
}
