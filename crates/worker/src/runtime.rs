//! The worker claim/execute loop.
//!
//! Control flow per job:
//! 1. A dispatch message names a job id.
//! 2. The store claim (PENDING + unowned → RUNNING) decides the race with
//!    other replicas; a lost claim drops the message.
//! 3. Execution walks the positions × locations grid. Before every
//!    combination the worker re-reads the record: CANCELLED abandons work,
//!    a pending `pause_until` suspends it, and either way the read doubles
//!    as the lease heartbeat.
//! 4. The terminal write re-checks state under the version counter, so a
//!    cancellation that raced the final step always wins.

use crate::automation::{AutomationTask, TaskError};
use chrono::Utc;
use futures::StreamExt;
use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::error::{DomainError, Result};
use jobbot_domain::jobs::Job;
use jobbot_domain::store::JobStore;
use jobbot_shared::{JobId, JobState, WorkerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, instrument, warn};

/// Tuning knobs for the execution engine
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Upper bound on one automation step, so a wedged external call
    /// cannot hold off pause/cancel checks indefinitely
    pub step_timeout: Duration,

    /// How often a paused worker re-reads the record and renews its lease
    pub pause_poll_interval: Duration,

    /// Backoff ceiling for bus re-subscription
    pub max_backoff: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            pause_poll_interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Outcome of a checkpoint: keep going with the freshest record, or stop
/// because the job reached a terminal state underneath us.
enum Checkpoint {
    Continue(Job),
    Abandon,
}

/// Wakeup channel fed by in-flight control signals. A signal only shortens
/// the reaction time; every decision is re-validated against the store,
/// which the control API always writes before publishing.
struct ControlFlags {
    changed: Notify,
}

impl ControlFlags {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            changed: Notify::new(),
        })
    }
}

pub struct WorkerRuntime {
    worker_id: WorkerId,
    store: Arc<dyn JobStore>,
    bus: Arc<dyn CommandBus>,
    task: Arc<dyn AutomationTask>,
    options: RuntimeOptions,
}

impl WorkerRuntime {
    pub fn new(
        worker_id: WorkerId,
        store: Arc<dyn JobStore>,
        bus: Arc<dyn CommandBus>,
        task: Arc<dyn AutomationTask>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            worker_id,
            store,
            bus,
            task,
            options,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Runs the claim loop until the shutdown signal fires.
    ///
    /// The dispatch subscription is re-established with exponential backoff
    /// when the bus connection drops.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(worker_id = %self.worker_id, "Worker runtime started");

        let mut backoff = Duration::from_secs(1);

        'outer: loop {
            let mut dispatches = match self.bus.dispatch_stream().await {
                Ok(stream) => {
                    backoff = Duration::from_secs(1);
                    stream
                }
                Err(e) => {
                    error!("Failed to subscribe to dispatch stream: {}. Retrying in {:?}", e, backoff);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {
                            backoff = std::cmp::min(backoff * 2, self.options.max_backoff);
                            continue;
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(worker_id = %self.worker_id, "Shutdown signal received");
                        break 'outer;
                    }
                    next = dispatches.next() => match next {
                        Some(Ok(message)) => {
                            self.handle_dispatch(message.job_id).await;
                        }
                        Some(Err(e)) => {
                            warn!("Dispatch stream error: {}", e);
                        }
                        None => {
                            warn!("Dispatch stream ended, re-subscribing");
                            break;
                        }
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, "Worker runtime stopped");
    }

    /// Claims and executes one dispatched job. All errors are absorbed into
    /// the job record; nothing propagates to the dispatch loop.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn handle_dispatch(&self, job_id: JobId) {
        let job = match self.store.claim(&job_id, &self.worker_id).await {
            Ok(job) => job,
            Err(DomainError::ClaimLost { .. }) => {
                // Another replica won, or the job was cancelled before any
                // claim. Duplicate dispatch messages land here too.
                debug!(%job_id, "Claim lost, dropping dispatch message");
                return;
            }
            Err(e) => {
                warn!(%job_id, "Claim failed: {}", e);
                return;
            }
        };

        info!(%job_id, "Job claimed");

        let flags = ControlFlags::new();
        let listener = self.spawn_control_listener(&job_id, flags.clone()).await;

        if let Err(e) = self.execute(job, &flags).await {
            // Store outages land here; the lease reaper will eventually
            // recover the job for another attempt.
            error!(%job_id, "Execution aborted: {}", e);
        }

        if let Some(handle) = listener {
            handle.abort();
        }
    }

    /// Subscribes to the job's control subject and mirrors signals into
    /// local flags. Best effort: without the subscription the worker still
    /// converges via checkpoint polling.
    async fn spawn_control_listener(
        &self,
        job_id: &JobId,
        flags: Arc<ControlFlags>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        match self.bus.control_stream(job_id).await {
            Ok(mut stream) => Some(tokio::spawn(async move {
                while let Some(result) = stream.next().await {
                    match result {
                        Ok(signal) => {
                            debug!(job_id = %signal.job_id, kind = %signal.kind, "Control signal received");
                            flags.changed.notify_waiters();
                        }
                        Err(e) => {
                            warn!("Control stream error: {}", e);
                        }
                    }
                }
            })),
            Err(e) => {
                warn!(%job_id, "Control subscription failed, falling back to polling: {}", e);
                None
            }
        }
    }

    /// Walks the positions × locations grid with a checkpoint before every
    /// combination, then performs the guarded terminal write.
    async fn execute(&self, job: Job, flags: &ControlFlags) -> Result<()> {
        let job_id = job.id.clone();
        let combinations: Vec<(String, String)> = job
            .spec
            .positions
            .iter()
            .flat_map(|p| job.spec.locations.iter().map(move |l| (p.clone(), l.clone())))
            .collect();

        let mut current = job;

        for (position, location) in combinations {
            current = match self.checkpoint(current, flags).await? {
                Checkpoint::Continue(job) => job,
                Checkpoint::Abandon => {
                    info!(%job_id, "Job abandoned at checkpoint");
                    return Ok(());
                }
            };

            let step = tokio::time::timeout(
                self.options.step_timeout,
                self.task.apply(&current, &position, &location),
            )
            .await;

            match step {
                Ok(Ok(())) => {
                    current.record_application();
                    current = match self.store.update(&current).await {
                        Ok(job) => job,
                        // Progress bookkeeping lost a race (e.g. against a
                        // pause write); the next checkpoint re-reads anyway.
                        Err(DomainError::VersionConflict { .. }) => {
                            self.refresh(&job_id).await?
                        }
                        Err(e) => return Err(e),
                    };
                }
                Ok(Err(TaskError::Skipped(reason))) => {
                    info!(%job_id, position, location, "Combination skipped: {}", reason);
                }
                Ok(Err(TaskError::Fatal(message))) => {
                    warn!(%job_id, "Task failed: {}", message);
                    self.finish(&job_id, Err(message)).await;
                    return Ok(());
                }
                Err(_) => {
                    let message = format!(
                        "automation step exceeded {}s timeout",
                        self.options.step_timeout.as_secs()
                    );
                    warn!(%job_id, "{}", message);
                    self.finish(&job_id, Err(message)).await;
                    return Ok(());
                }
            }
        }

        self.finish(&job_id, Ok(())).await;
        Ok(())
    }

    async fn refresh(&self, job_id: &JobId) -> Result<Job> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| DomainError::JobNotFound {
                job_id: job_id.clone(),
            })
    }

    /// The cooperative pause/cancel check inserted before every
    /// combination. Also renews the ownership lease.
    async fn checkpoint(&self, job: Job, flags: &ControlFlags) -> Result<Checkpoint> {
        let job_id = job.id;

        loop {
            // The store is authoritative; local flags only got us here
            // faster.
            let fresh = match self.store.find_by_id(&job_id).await? {
                Some(job) => job,
                None => {
                    warn!(%job_id, "Job record disappeared, abandoning");
                    return Ok(Checkpoint::Abandon);
                }
            };

            if fresh.state.is_terminal() {
                return Ok(Checkpoint::Abandon);
            }

            if fresh.owner.as_ref() != Some(&self.worker_id) {
                // The lease reaper re-owned the job after presuming this
                // replica dead. Stop touching it.
                warn!(%job_id, "Ownership lost, abandoning");
                return Ok(Checkpoint::Abandon);
            }

            if fresh.state == JobState::Running && fresh.pause_requested(Utc::now()) {
                match self.wait_out_pause(fresh, flags).await? {
                    // Re-evaluate: a new pause or cancel may have landed
                    Some(_resumed) => continue,
                    None => return Ok(Checkpoint::Abandon),
                }
            }

            // Renew the lease
            let mut renewed = fresh;
            renewed.touch();
            match self.store.update(&renewed).await {
                Ok(job) => return Ok(Checkpoint::Continue(job)),
                Err(DomainError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Transitions RUNNING → PAUSED, blocks until `pause_until` elapses
    /// (renewing the lease and watching for cancellation each slice), then
    /// transitions back to RUNNING.
    ///
    /// Returns the resumed record, or None when the job was cancelled while
    /// paused.
    async fn wait_out_pause(&self, job: Job, flags: &ControlFlags) -> Result<Option<Job>> {
        let job_id = job.id.clone();
        let mut deadline = match job.pause_until {
            Some(until) => until,
            None => return Ok(Some(job)),
        };

        let mut paused = job;
        paused.pause()?;
        let mut current = match self.store.update(&paused).await {
            Ok(job) => job,
            Err(DomainError::VersionConflict { .. }) => {
                // A concurrent write (cancel, new deadline) landed first;
                // let the checkpoint loop re-evaluate from fresh state.
                return self.refresh(&job_id).await.map(Some);
            }
            Err(e) => return Err(e),
        };

        info!(%job_id, until = %deadline, "Job paused");

        loop {
            let now = Utc::now();
            if now >= deadline {
                break;
            }

            let remaining = (deadline - now)
                .to_std()
                .unwrap_or(self.options.pause_poll_interval);
            let slice = remaining.min(self.options.pause_poll_interval);

            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = flags.changed.notified() => {}
            }

            let fresh = match self.store.find_by_id(&job_id).await? {
                Some(job) => job,
                None => return Ok(None),
            };

            if fresh.state.is_terminal() {
                info!(%job_id, "Job cancelled while paused");
                return Ok(None);
            }

            if let Some(until) = fresh.pause_until {
                deadline = until;
            }

            // Renew the lease so the reaper does not re-queue a paused job
            let mut renewed = fresh;
            renewed.touch();
            match self.store.update(&renewed).await {
                Ok(job) => current = job,
                Err(DomainError::VersionConflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        // Deadline elapsed: PAUSED → RUNNING
        loop {
            if current.state.is_terminal() {
                return Ok(None);
            }

            if current.state != JobState::Paused {
                return Ok(Some(current));
            }

            let mut resumed = current.clone();
            resumed.resume()?;
            match self.store.update(&resumed).await {
                Ok(job) => {
                    info!(%job_id, "Job resumed");
                    return Ok(Some(job));
                }
                Err(DomainError::VersionConflict { .. }) => {
                    current = self.refresh(&job_id).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Guarded terminal write: only a job still RUNNING under this worker
    /// is completed or failed. A cancellation that won the race is left
    /// untouched.
    async fn finish(&self, job_id: &JobId, outcome: std::result::Result<(), String>) {
        loop {
            let fresh = match self.store.find_by_id(job_id).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    warn!(%job_id, "Job record disappeared before terminal write");
                    return;
                }
                Err(e) => {
                    error!(%job_id, "Store unavailable during terminal write: {}", e);
                    return;
                }
            };

            if fresh.state != JobState::Running || fresh.owner.as_ref() != Some(&self.worker_id) {
                info!(%job_id, state = %fresh.state, "Skipping terminal write, job no longer ours");
                return;
            }

            let mut terminal = fresh;
            let write = match &outcome {
                Ok(()) => terminal.complete(),
                Err(message) => terminal.fail(message.clone()),
            };
            if let Err(e) = write {
                warn!(%job_id, "Terminal transition rejected: {}", e);
                return;
            }

            match self.store.update(&terminal).await {
                Ok(_) => {
                    info!(%job_id, state = %terminal.state, applied = terminal.applied, "Job finished");
                    return;
                }
                Err(DomainError::VersionConflict { .. }) => {
                    // Someone wrote in between (cancellation); re-read and
                    // re-check.
                    continue;
                }
                Err(e) => {
                    error!(%job_id, "Terminal write failed: {}", e);
                    return;
                }
            }
        }
    }
}
