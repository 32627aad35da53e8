//! JobBot control plane server.
//!
//! Wires the configured store and bus into the use cases, spawns the lease
//! reaper, and serves the HTTP control API. With neither PostgreSQL nor
//! NATS configured it runs in single-node mode: in-process store and bus
//! plus an embedded worker replica, so a local deployment works end to end
//! out of the box.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jobbot_application::{CancelJobUseCase, GetJobUseCase, PauseJobUseCase, SubmitJobUseCase};
use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::store::JobStore;
use jobbot_infrastructure::{
    InMemoryCommandBus, InMemoryJobStore, LeaseReaper, LeaseReaperConfig, NatsCommandBus,
    NatsConfig, PostgresJobStore,
};
use jobbot_interface::{create_router, AppState};
use jobbot_shared::config::{ConfigLoader, ServerConfigDto};
use jobbot_shared::WorkerId;
use jobbot_worker::{DryRunAutomation, RuntimeOptions, WorkerRuntime};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = PathBuf::from(".env");
    let loader = ConfigLoader::new(env_file.exists().then_some(env_file));
    let config = loader.load_server_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.logging.filter.clone()))
        .init();

    info!("Starting JobBot control plane server");

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_sender = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_sender.send(());
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    let store = build_store(&config).await?;
    let (bus, single_node) = build_bus(&config).await?;

    // Reconciliation sweep: re-queues jobs whose worker died mid-flight
    let reaper = LeaseReaper::new(
        store.clone(),
        bus.clone(),
        LeaseReaperConfig {
            tick_interval: Duration::from_secs(config.reaper.tick_interval_secs),
            lease_timeout: Duration::from_secs(config.reaper.lease_timeout_secs),
            batch_size: config.reaper.batch_size,
            enabled: config.reaper.enabled,
        },
    );
    tokio::spawn(reaper.run(shutdown_tx.subscribe()));

    if single_node {
        warn!("No NATS/PostgreSQL configured: running single-node with an embedded worker");
        let runtime = WorkerRuntime::new(
            WorkerId::new(),
            store.clone(),
            bus.clone(),
            Arc::new(DryRunAutomation::default()),
            RuntimeOptions::default(),
        );
        let worker_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { runtime.run(worker_shutdown).await });
    }

    let state = AppState {
        submit_job: Arc::new(SubmitJobUseCase::new(store.clone(), bus.clone())),
        pause_job: Arc::new(PauseJobUseCase::new(store.clone(), bus.clone())),
        cancel_job: Arc::new(CancelJobUseCase::new(store.clone(), bus.clone())),
        get_job: Arc::new(GetJobUseCase::new(store)),
    };

    let app = create_router().with_state(state);
    let listener = tokio::net::TcpListener::bind(config.http.bind_address).await?;
    info!("Control API listening on {}", config.http.bind_address);

    let mut serve_shutdown = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.recv().await;
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn build_store(
    config: &ServerConfigDto,
) -> Result<Arc<dyn JobStore>, Box<dyn std::error::Error>> {
    if config.database.url.is_some() {
        let store = PostgresJobStore::connect(&config.database).await?;
        store.run_migrations().await?;
        info!("Connected to PostgreSQL job store");
        Ok(Arc::new(store))
    } else {
        info!("Using in-memory job store");
        Ok(Arc::new(InMemoryJobStore::new()))
    }
}

/// Returns the bus plus whether the process should embed a worker replica
/// (single-node mode, where no external worker can reach the bus).
async fn build_bus(
    config: &ServerConfigDto,
) -> Result<(Arc<dyn CommandBus>, bool), Box<dyn std::error::Error>> {
    if config.messaging.nats_urls.is_empty() {
        info!("Using in-process command bus");
        Ok((Arc::new(InMemoryCommandBus::new()), true))
    } else {
        let bus = NatsCommandBus::new(NatsConfig::from_messaging(
            &config.messaging,
            "jobbot-server",
        ))
        .await?;
        info!("Connected to NATS command bus");
        Ok((Arc::new(bus), false))
    }
}
