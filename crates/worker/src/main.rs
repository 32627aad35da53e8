use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jobbot_infrastructure::{NatsCommandBus, NatsConfig, PostgresJobStore};
use jobbot_shared::config::DatabaseConfig;
use jobbot_worker::{DryRunAutomation, WorkerConfig, WorkerRuntime};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("JOBBOT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WorkerConfig::default();
    info!(
        worker_id = %config.worker_id,
        name = %config.worker_name,
        "Starting JobBot worker"
    );

    // Shutdown signal fan-out
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let shutdown_sender = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, draining...");
                let _ = shutdown_sender.send(());
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    // The worker shares the durable store with every other replica; an
    // in-memory store would defeat the claim protocol, so it is required.
    let database_url = config
        .database_url
        .clone()
        .ok_or("JOBBOT_DATABASE_URL is required for worker replicas")?;

    let store = PostgresJobStore::connect(&DatabaseConfig {
        url: Some(database_url),
        pool_size: 5,
        connect_timeout_secs: 5,
    })
    .await?;
    store.run_migrations().await?;
    info!("Connected to job store");

    let bus = NatsCommandBus::new(NatsConfig {
        urls: config.nats_urls.clone(),
        name: Some(config.worker_name.clone()),
        ..Default::default()
    })
    .await?;
    info!("Connected to command bus");

    let runtime = WorkerRuntime::new(
        config.worker_id.clone(),
        Arc::new(store),
        Arc::new(bus),
        Arc::new(DryRunAutomation::default()),
        config.runtime_options(),
    );

    runtime.run(shutdown_rx).await;

    info!("Worker shutdown complete");
    Ok(())
}
