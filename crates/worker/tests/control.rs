//! Pause and cancel behavior of an in-flight worker.

mod common;

use common::*;
use jobbot_application::{
    CancelJobRequest, CancelJobUseCase, PauseJobRequest, PauseJobUseCase,
};
use jobbot_domain::command_bus::CommandBus;
use jobbot_domain::messages::DispatchMessage;
use jobbot_domain::store::JobStore;
use jobbot_infrastructure::{InMemoryCommandBus, InMemoryJobStore};
use jobbot_shared::JobState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_pause_suspends_checkpoints_until_deadline() {
    let store = InMemoryJobStore::new();
    let bus = InMemoryCommandBus::new();

    // Enough combinations that the job is still running when we pause
    let job = job_with_combinations(1, 20);
    let job_id = job.id.clone();
    store.insert(&job).await.unwrap();
    bus.publish_dispatch(&DispatchMessage::new(job_id.clone()))
        .await
        .unwrap();

    let task = SlowAutomation::new(Duration::from_millis(50));
    let worker = RunningWorker::spawn(&store, &bus, task.clone());

    await_state(&store, &job_id, JobState::Running, Duration::from_secs(2)).await;

    let pause = PauseJobUseCase::new(Arc::new(store.clone()), Arc::new(bus.clone()));
    pause
        .execute(PauseJobRequest {
            job_id: Some(job_id.clone()),
            duration_secs: 1,
        })
        .await
        .unwrap();

    // The worker reports PAUSED at its next checkpoint
    let paused = await_state(&store, &job_id, JobState::Paused, Duration::from_secs(2)).await;
    let applied_at_pause = paused.applied;
    let steps_at_pause = task.steps.load(Ordering::SeqCst);

    // No checkpoint completes while paused
    tokio::time::sleep(Duration::from_millis(400)).await;
    let still_paused = store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(still_paused.state, JobState::Paused);
    assert_eq!(still_paused.applied, applied_at_pause);
    assert_eq!(task.steps.load(Ordering::SeqCst), steps_at_pause);

    // After the deadline the worker resumes on its own
    await_state(&store, &job_id, JobState::Running, Duration::from_secs(3)).await;

    let finished = await_terminal(&store, &job_id, Duration::from_secs(5)).await;
    assert_eq!(finished.state, JobState::Succeeded);
    assert_eq!(finished.applied, 20);

    worker.stop().await;
}

#[tokio::test]
async fn test_cancel_mid_run_abandons_at_next_checkpoint() {
    let store = InMemoryJobStore::new();
    let bus = InMemoryCommandBus::new();

    let job = job_with_combinations(1, 50);
    let job_id = job.id.clone();
    store.insert(&job).await.unwrap();
    bus.publish_dispatch(&DispatchMessage::new(job_id.clone()))
        .await
        .unwrap();

    let task = SlowAutomation::new(Duration::from_millis(30));
    let worker = RunningWorker::spawn(&store, &bus, task.clone());

    await_state(&store, &job_id, JobState::Running, Duration::from_secs(2)).await;
    // Let a few combinations complete first
    tokio::time::sleep(Duration::from_millis(150)).await;

    let cancel = CancelJobUseCase::new(Arc::new(store.clone()), Arc::new(bus.clone()));
    cancel
        .execute(CancelJobRequest {
            job_id: Some(job_id.clone()),
        })
        .await
        .unwrap();

    // The cancel write is immediate; the worker must not overwrite it
    let finished = await_terminal(&store, &job_id, Duration::from_secs(2)).await;
    assert_eq!(finished.state, JobState::Cancelled);
    assert!(finished.owner.is_none());
    assert!(finished.applied < 50, "worker must stop before finishing the grid");

    // The worker settles; progress stops advancing
    let settled_steps = task.steps.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        task.steps.load(Ordering::SeqCst) <= settled_steps + 1,
        "at most the in-flight step may finish after cancellation"
    );
    assert_eq!(
        store.find_by_id(&job_id).await.unwrap().unwrap().state,
        JobState::Cancelled
    );

    worker.stop().await;
}

#[tokio::test]
async fn test_cancel_while_paused_wins() {
    let store = InMemoryJobStore::new();
    let bus = InMemoryCommandBus::new();

    let job = job_with_combinations(1, 10);
    let job_id = job.id.clone();
    store.insert(&job).await.unwrap();
    bus.publish_dispatch(&DispatchMessage::new(job_id.clone()))
        .await
        .unwrap();

    let task = SlowAutomation::new(Duration::from_millis(40));
    let worker = RunningWorker::spawn(&store, &bus, task);

    await_state(&store, &job_id, JobState::Running, Duration::from_secs(2)).await;

    let pause = PauseJobUseCase::new(Arc::new(store.clone()), Arc::new(bus.clone()));
    pause
        .execute(PauseJobRequest {
            job_id: Some(job_id.clone()),
            duration_secs: 30,
        })
        .await
        .unwrap();
    await_state(&store, &job_id, JobState::Paused, Duration::from_secs(2)).await;

    let cancel = CancelJobUseCase::new(Arc::new(store.clone()), Arc::new(bus.clone()));
    cancel
        .execute(CancelJobRequest {
            job_id: Some(job_id.clone()),
        })
        .await
        .unwrap();

    let finished = await_terminal(&store, &job_id, Duration::from_secs(2)).await;
    assert_eq!(finished.state, JobState::Cancelled);
    assert!(finished.pause_until.is_none());

    // The paused worker notices and never resumes the job
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        store.find_by_id(&job_id).await.unwrap().unwrap().state,
        JobState::Cancelled
    );

    worker.stop().await;
}

#[tokio::test]
async fn test_cancel_racing_completion_is_never_overwritten() {
    use async_trait::async_trait;
    use jobbot_domain::jobs::Job;
    use jobbot_worker::{AutomationTask, TaskError};

    /// Cancels its own job from inside the final step, emulating an
    /// operator cancel that lands between the last checkpoint and the
    /// terminal write.
    struct CancelDuringStep {
        store: InMemoryJobStore,
    }

    #[async_trait]
    impl AutomationTask for CancelDuringStep {
        async fn apply(&self, job: &Job, _p: &str, _l: &str) -> Result<(), TaskError> {
            let mut fresh = self
                .store
                .find_by_id(&job.id)
                .await
                .unwrap()
                .unwrap();
            fresh.cancel().unwrap();
            self.store.update(&fresh).await.unwrap();
            Ok(())
        }
    }

    let store = InMemoryJobStore::new();
    let bus = InMemoryCommandBus::new();

    let job = job_with_combinations(1, 1);
    let job_id = job.id.clone();
    store.insert(&job).await.unwrap();
    bus.publish_dispatch(&DispatchMessage::new(job_id.clone()))
        .await
        .unwrap();

    let worker = RunningWorker::spawn(
        &store,
        &bus,
        Arc::new(CancelDuringStep {
            store: store.clone(),
        }),
    );

    let finished = await_terminal(&store, &job_id, Duration::from_secs(2)).await;
    assert_eq!(finished.state, JobState::Cancelled);

    // The worker's completion path ran after the cancel; CANCELLED must
    // survive it
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = store.find_by_id(&job_id).await.unwrap().unwrap();
    assert_eq!(settled.state, JobState::Cancelled);

    worker.stop().await;
}
