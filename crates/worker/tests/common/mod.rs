//! Shared fixtures for worker runtime tests.
#![allow(dead_code)]

use async_trait::async_trait;
use jobbot_domain::jobs::{Job, SearchSpec};
use jobbot_domain::store::JobStore;
use jobbot_infrastructure::{InMemoryCommandBus, InMemoryJobStore};
use jobbot_shared::{JobId, JobState, WorkerId};
use jobbot_worker::{AutomationTask, RuntimeOptions, TaskError, WorkerRuntime};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Automation stub with a fixed per-step delay and a step counter
pub struct SlowAutomation {
    pub step_delay: Duration,
    pub steps: AtomicU32,
}

impl SlowAutomation {
    pub fn new(step_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            step_delay,
            steps: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl AutomationTask for SlowAutomation {
    async fn apply(&self, _job: &Job, _position: &str, _location: &str) -> Result<(), TaskError> {
        tokio::time::sleep(self.step_delay).await;
        self.steps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn job_with_combinations(positions: usize, locations: usize) -> Job {
    Job::new(SearchSpec::new(
        (0..positions).map(|i| format!("position-{}", i)).collect(),
        (0..locations).map(|i| format!("location-{}", i)).collect(),
    ))
    .unwrap()
}

/// Test-friendly runtime options: tight polling so assertions on timing
/// stay fast and stable
pub fn fast_options() -> RuntimeOptions {
    RuntimeOptions {
        step_timeout: Duration::from_secs(5),
        pause_poll_interval: Duration::from_millis(25),
        max_backoff: Duration::from_secs(1),
    }
}

pub struct RunningWorker {
    pub worker_id: WorkerId,
    shutdown: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl RunningWorker {
    /// Spawns a worker runtime over the given store/bus and returns a
    /// handle that shuts it down on drop
    pub fn spawn(
        store: &InMemoryJobStore,
        bus: &InMemoryCommandBus,
        task: Arc<dyn AutomationTask>,
    ) -> Self {
        let worker_id = WorkerId::new();
        let runtime = Arc::new(WorkerRuntime::new(
            worker_id.clone(),
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            task,
            fast_options(),
        ));

        let (shutdown, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { runtime.run(rx).await });

        Self {
            worker_id,
            shutdown,
            handle,
        }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

/// Polls the store until the job reaches a terminal state or the timeout
/// elapses; returns the final record.
pub async fn await_terminal(store: &InMemoryJobStore, job_id: &JobId, timeout: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = store.find_by_id(job_id).await.unwrap().unwrap();
        if job.state.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {} after {:?}",
            job_id,
            job.state,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Polls the store until the job is observed in `state`
pub async fn await_state(
    store: &InMemoryJobStore,
    job_id: &JobId,
    state: JobState,
    timeout: Duration,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = store.find_by_id(job_id).await.unwrap().unwrap();
        if job.state == state {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {} (waiting for {}) after {:?}",
            job_id,
            job.state,
            state,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
