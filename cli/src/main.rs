//! CLI entrypoint for conductor
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Cli;
use conductor_application::{
    ExecutionServices, EventStreamFactory, MemoryFactory, ProviderFactory, QueryOrchestrator,
    ReconcileAction, ResourceStore,
};
use conductor_domain::{QueryKey, resource::default_namespace};
use conductor_infrastructure::config::FileMemoryConfig;
use conductor_infrastructure::{
    ConfigLoader, HttpMemoryFactory, HttpProviderFactory, InMemoryResourceStore,
    JsonlEventStreamFactory, Manifest, ModelProbe, ReqwestToolBackends, Settings,
    TracingTelemetry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    info!("Starting conductor");

    let file_config = ConfigLoader::load(cli.config.as_deref()).context("failed to load configuration")?;
    let settings = file_config.validate().context("invalid configuration")?;

    let manifest = Manifest::load(&cli.manifest)
        .with_context(|| format!("failed to load manifest {}", cli.manifest.display()))?;
    let store = Arc::new(InMemoryResourceStore::from_manifest(manifest));
    let providers = Arc::new(HttpProviderFactory::new());

    if cli.probe_models {
        return probe_models(&store, providers.as_ref(), settings.probe_timeout).await;
    }

    let keys = select_queries(&store, &cli.query)?;
    let orchestrator = build_orchestrator(&settings, Arc::clone(&store), providers)?;

    let mut results = Vec::with_capacity(keys.len());
    for key in &keys {
        let status = tokio::select! {
            status = run_query(&orchestrator, store.as_ref(), key) => status?,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling query {}", key);
                cancel_query(&orchestrator, store.as_ref(), key).await?
            }
        };
        results.push(json!({ "query": key.to_string(), "status": status }));
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Install the stderr subscriber, plus a file writer when `--log-file` is given.
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let Some(path) = &cli.log_file else {
        tracing_subscriber::registry().with(stderr).init();
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let Some(file_name) = path.file_name() else {
        bail!("--log-file must name a file: {}", path.display());
    };
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    let file = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter());

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(Some(guard))
}

fn build_orchestrator(
    settings: &Settings,
    store: Arc<InMemoryResourceStore>,
    providers: Arc<HttpProviderFactory>,
) -> Result<QueryOrchestrator> {
    let services = ExecutionServices::new(
        store.clone(),
        providers,
        Arc::new(ReqwestToolBackends::new(settings.http_tool_timeout)),
    )
    .with_telemetry(Arc::new(TracingTelemetry::new()))
    .with_params(settings.params.clone())
    .with_retry_policy(settings.retry.clone());

    let (memory_url, memory_timeout) = match &settings.memory {
        Some(memory) => (Some(memory.base_url.clone()), memory.timeout),
        None => (
            None,
            Duration::from_secs(FileMemoryConfig::default().timeout_secs),
        ),
    };
    let memories: Arc<dyn MemoryFactory> = Arc::new(
        HttpMemoryFactory::new(store, memory_url, memory_timeout)
            .context("failed to build memory client")?,
    );

    let mut orchestrator = QueryOrchestrator::new(services, memories);
    if let Some(path) = &settings.events_file {
        match JsonlEventStreamFactory::new(path) {
            Some(events) => {
                let events: Arc<dyn EventStreamFactory> = Arc::new(events);
                orchestrator = orchestrator.with_event_streams(events);
            }
            None => warn!("Cannot open event file {}, streaming disabled", path.display()),
        }
    }
    Ok(orchestrator)
}

/// Resolve `--query` arguments, or every query in the manifest.
fn select_queries(store: &InMemoryResourceStore, requested: &[String]) -> Result<Vec<QueryKey>> {
    let known = store.query_keys();
    if requested.is_empty() {
        if known.is_empty() {
            bail!("the manifest defines no queries");
        }
        return Ok(known);
    }

    requested
        .iter()
        .map(|name| {
            let key = match name.split_once('/') {
                Some((namespace, name)) => QueryKey::new(namespace, name),
                None => QueryKey::new(default_namespace(), name.as_str()),
            };
            if !known.contains(&key) {
                bail!("query {} is not defined in the manifest", key);
            }
            Ok(key)
        })
        .collect()
}

/// Executions of one query the CLI starts before giving up.
const MAX_EXECUTIONS: u32 = 3;

/// Counts executions started for one query.
///
/// An execution that ends without a terminal status (its status write
/// failed) leaves the query Running, and reconcile starts it again.
#[derive(Debug, Default)]
struct ExecutionBudget {
    started: u32,
}

impl ExecutionBudget {
    fn record_start(&mut self, key: &QueryKey) -> Result<()> {
        self.started += 1;
        if self.started > MAX_EXECUTIONS {
            bail!(
                "query {} was started {} times without reaching a terminal phase",
                key,
                MAX_EXECUTIONS
            );
        }
        if self.started > 1 {
            warn!(
                "Query {} restarted after an unfinished execution (attempt {})",
                key, self.started
            );
        }
        Ok(())
    }
}

/// Reconcile `key` until it reaches a terminal phase.
async fn run_query(
    orchestrator: &QueryOrchestrator,
    store: &dyn ResourceStore,
    key: &QueryKey,
) -> Result<serde_json::Value> {
    let mut budget = ExecutionBudget::default();
    loop {
        let action = orchestrator
            .reconcile(key)
            .await
            .with_context(|| format!("failed to reconcile query {}", key))?;
        match action {
            ReconcileAction::Started => {
                budget.record_start(key)?;
                orchestrator.wait(key).await
            }
            ReconcileAction::AlreadyRunning => orchestrator.wait(key).await,
            ReconcileAction::Finished(_) | ReconcileAction::Canceled | ReconcileAction::Gone => {
                break;
            }
            ReconcileAction::Expired => bail!("query {} expired before it finished", key),
            ReconcileAction::Admitted | ReconcileAction::MarkedRunning => {}
        }
    }
    query_status(store, key).await
}

async fn cancel_query(
    orchestrator: &QueryOrchestrator,
    store: &dyn ResourceStore,
    key: &QueryKey,
) -> Result<serde_json::Value> {
    if let Some(mut query) = store.get_query(key).await? {
        query.cancel = true;
        store.put_query(query).await?;
    }
    orchestrator
        .reconcile(key)
        .await
        .with_context(|| format!("failed to cancel query {}", key))?;
    orchestrator.wait(key).await;
    query_status(store, key).await
}

async fn query_status(store: &dyn ResourceStore, key: &QueryKey) -> Result<serde_json::Value> {
    let query = store
        .get_query(key)
        .await?
        .with_context(|| format!("query {} disappeared", key))?;
    Ok(serde_json::to_value(&query.status)?)
}

async fn probe_models(
    store: &InMemoryResourceStore,
    providers: &HttpProviderFactory,
    timeout: Duration,
) -> Result<()> {
    let probe = ModelProbe::new(timeout);
    let mut results = Vec::new();

    for model in store.all_models() {
        let name = format!("{}/{}", model.meta.namespace, model.meta.name);
        let (available, message) = match providers.create(&model) {
            Ok(provider) => {
                let result = probe.probe(provider.as_ref()).await;
                (result.available, result.message)
            }
            Err(err) => {
                warn!(model = %name, error = %err, "Cannot build provider");
                (false, "Probe failed (configuration error)".to_string())
            }
        };
        results.push(json!({ "model": name, "available": available, "message": message }));
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
