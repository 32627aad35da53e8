//! LeaseReaper - reconciliation sweep for orphaned jobs
//!
//! A worker that is killed mid-job leaves its job RUNNING or PAUSED with a
//! stale owner. The reaper runs periodically and:
//! 1. Finds owned jobs whose lease heartbeat exceeded the staleness
//!    threshold, returns them to PENDING and re-publishes their dispatch
//!    message so another replica picks them up.
//! 2. Finds PENDING jobs that lost their dispatch message (publish failure,
//!    or a consumer that died between ack and claim) and re-publishes it.
//!
//! Every write goes through the store's compare-and-set, so a live worker
//! that renews its lease mid-sweep wins and the reaper backs off.

use chrono::{Duration as ChronoDuration, Utc};
use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::messages::DispatchMessage;
use jobbot_domain::store::JobStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for the LeaseReaper
#[derive(Debug, Clone)]
pub struct LeaseReaperConfig {
    /// Interval between sweep cycles
    pub tick_interval: Duration,

    /// Owned jobs untouched for longer than this are presumed orphaned
    pub lease_timeout: Duration,

    /// Maximum jobs processed per cycle
    pub batch_size: usize,

    /// Whether the reaper runs at all
    pub enabled: bool,
}

impl Default for LeaseReaperConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            lease_timeout: Duration::from_secs(120),
            batch_size: 100,
            enabled: true,
        }
    }
}

/// Result of one sweep cycle
#[derive(Debug, Default)]
pub struct LeaseReaperResult {
    /// Orphaned jobs returned to PENDING
    pub requeued: u64,

    /// Dispatch messages re-published for stale PENDING jobs
    pub redispatched: u64,

    /// Errors encountered (the cycle continues past individual failures)
    pub errors: Vec<String>,

    /// Cycle duration
    pub execution_time_ms: u64,
}

pub struct LeaseReaper {
    store: Arc<dyn JobStore>,
    bus: Arc<dyn CommandBus>,
    config: LeaseReaperConfig,
}

impl LeaseReaper {
    pub fn new(
        store: Arc<dyn JobStore>,
        bus: Arc<dyn CommandBus>,
        config: LeaseReaperConfig,
    ) -> Self {
        Self { store, bus, config }
    }

    /// Runs sweep cycles until the shutdown signal fires
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("LeaseReaper disabled by configuration");
            return;
        }

        info!(
            lease_timeout_secs = self.config.lease_timeout.as_secs(),
            tick_secs = self.config.tick_interval.as_secs(),
            "LeaseReaper started"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.run_cycle().await;
                    if result.requeued > 0 || result.redispatched > 0 || !result.errors.is_empty() {
                        info!(
                            requeued = result.requeued,
                            redispatched = result.redispatched,
                            errors = result.errors.len(),
                            duration_ms = result.execution_time_ms,
                            "Reconciliation cycle complete"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("LeaseReaper shutting down");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass
    pub async fn run_cycle(&self) -> LeaseReaperResult {
        let started = Instant::now();
        let mut result = LeaseReaperResult::default();

        let lease_secs = self.config.lease_timeout.as_secs() as i64;
        let cutoff = Utc::now() - ChronoDuration::seconds(lease_secs);

        match self.store.find_stale_owned(cutoff, self.config.batch_size).await {
            Ok(orphans) => {
                for job in orphans {
                    match self.requeue_orphan(job).await {
                        Ok(true) => result.requeued += 1,
                        Ok(false) => {}
                        Err(e) => result.errors.push(e.to_string()),
                    }
                }
            }
            Err(e) => {
                error!("Failed to query stale owned jobs: {}", e);
                result.errors.push(e.to_string());
            }
        }

        match self
            .store
            .find_stale_pending(cutoff, self.config.batch_size)
            .await
        {
            Ok(stale) => {
                for job in stale {
                    match self.redispatch_pending(job).await {
                        Ok(true) => result.redispatched += 1,
                        Ok(false) => {}
                        Err(e) => result.errors.push(e.to_string()),
                    }
                }
            }
            Err(e) => {
                error!("Failed to query stale pending jobs: {}", e);
                result.errors.push(e.to_string());
            }
        }

        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Returns an orphaned job to PENDING and re-dispatches it.
    /// Ok(false) means another writer touched the job first.
    async fn requeue_orphan(&self, mut job: jobbot_domain::jobs::Job) -> Result<bool> {
        let job_id = job.id.clone();
        let stale_owner = job.owner.clone();

        job.release_to_pending()?;

        match self.store.update(&job).await {
            Ok(_) => {
                warn!(
                    %job_id,
                    owner = ?stale_owner,
                    "Ownership lease expired, job returned to PENDING"
                );
                self.bus
                    .publish_dispatch(&DispatchMessage::new(job_id))
                    .await?;
                Ok(true)
            }
            Err(DomainError::VersionConflict { .. }) => {
                // The owner came back (or the job completed) mid-sweep
                debug!(%job_id, "Skipping requeue, job was updated concurrently");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-publishes the dispatch message for a PENDING job nobody picked up.
    /// Touches the record first so the next cycle does not re-publish again
    /// before the lease window elapses.
    async fn redispatch_pending(&self, mut job: jobbot_domain::jobs::Job) -> Result<bool> {
        let job_id = job.id.clone();
        job.touch();

        match self.store.update(&job).await {
            Ok(_) => {
                warn!(%job_id, "Re-publishing dispatch for stale pending job");
                self.bus
                    .publish_dispatch(&DispatchMessage::new(job_id))
                    .await?;
                Ok(true)
            }
            Err(DomainError::VersionConflict { .. }) => {
                debug!(%job_id, "Skipping redispatch, job was updated concurrently");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
