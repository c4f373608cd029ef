//! Terminology worker binary.
//!
//! Loads the content graph snapshot, creates every missing default expansion
//! and saves the snapshot again.

use std::sync::Arc;

use ocl_core::{TerminologyStore, WriteContext};
use ocl_worker::{snapshot, spawn_event_logger, ChannelEventHook, TaskOutcome, TaskRunner, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = WorkerConfig::load()?;
    tracing::info!("Using snapshot at: {}", config.data_path.display());

    let mut store = match snapshot::load(&config.data_path)? {
        Some(graph) => TerminologyStore::from_graph(graph, config.engine.clone()),
        None => {
            tracing::warn!("No snapshot found, starting with an empty store");
            TerminologyStore::with_config(config.engine.clone())
        }
    };
    let stats = store.stats();
    tracing::info!(
        "Loaded {} repositories, {} content versions, {} references, {} expansions",
        stats.repositories,
        stats.content_versions,
        stats.references,
        stats.expansions
    );

    let (hook, events) = ChannelEventHook::channel();
    store.add_event_hook(Arc::new(hook));
    let logger = spawn_event_logger(events);

    let runner = TaskRunner::new(store, config.max_tasks);
    if config.ensure_expansions_on_start {
        let task = runner.submit_collection_expansions(WriteContext::system()).await;
        match runner.wait(task).await {
            Ok(TaskOutcome::Expansions(created)) => {
                tracing::info!("Created {} default expansions", created.len())
            }
            Ok(other) => tracing::warn!("Unexpected task outcome: {:?}", other),
            Err(e) => tracing::warn!("Collection expansions job failed: {}", e),
        }
    }

    {
        let store = runner.store().read().await;
        snapshot::save(store.graph(), &config.data_path)?;
    }

    // Dropping the store closes the event channel
    drop(runner);
    let events_seen = logger.await?;
    tracing::info!("Processed {} store events", events_seen);

    Ok(())
}
