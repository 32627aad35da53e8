//! In-process command bus.
//!
//! Mirrors the NATS bus semantics closely enough for tests and single-node
//! runs: dispatch messages form a work queue where streams compete for
//! messages; control signals fan out per job and are dropped when nobody
//! listens (the job record stays authoritative either way).

use async_stream::stream;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use jobbot_domain::command_bus::{CommandBus, CommandBusError};
use jobbot_domain::messages::{ControlSignal, DispatchMessage};
use jobbot_shared::JobId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

const CONTROL_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Default)]
pub struct InMemoryCommandBus {
    dispatch: Arc<Mutex<VecDeque<DispatchMessage>>>,
    dispatch_notify: Arc<Notify>,
    control: Arc<DashMap<JobId, broadcast::Sender<ControlSignal>>>,
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatch messages not yet consumed
    pub fn dispatch_depth(&self) -> usize {
        self.dispatch.lock().unwrap().len()
    }

    fn control_sender(&self, job_id: &JobId) -> broadcast::Sender<ControlSignal> {
        self.control
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(CONTROL_CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn publish_dispatch(&self, message: &DispatchMessage) -> Result<(), CommandBusError> {
        self.dispatch.lock().unwrap().push_back(message.clone());
        self.dispatch_notify.notify_one();
        Ok(())
    }

    async fn publish_control(&self, signal: &ControlSignal) -> Result<(), CommandBusError> {
        // A send with no subscribers just drops the signal; the owning
        // worker will still see the store write at its next checkpoint.
        let _ = self.control_sender(&signal.job_id).send(signal.clone());
        Ok(())
    }

    async fn dispatch_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<DispatchMessage, CommandBusError>>, CommandBusError>
    {
        let queue = self.dispatch.clone();
        let notify = self.dispatch_notify.clone();

        let stream = stream! {
            loop {
                let next = queue.lock().unwrap().pop_front();
                match next {
                    Some(message) => yield Ok(message),
                    None => notify.notified().await,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn control_stream(
        &self,
        job_id: &JobId,
    ) -> Result<BoxStream<'static, Result<ControlSignal, CommandBusError>>, CommandBusError> {
        let mut rx = self.control_sender(job_id).subscribe();

        let stream = stream! {
            loop {
                match rx.recv().await {
                    Ok(signal) => yield Ok(signal),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use jobbot_domain::messages::ControlKind;

    #[tokio::test]
    async fn test_dispatch_is_consumed_once() {
        let bus = InMemoryCommandBus::new();
        let message = DispatchMessage::new(JobId::new());
        bus.publish_dispatch(&message).await.unwrap();

        let mut stream = bus.dispatch_stream().await.unwrap();
        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received, message);
        assert_eq!(bus.dispatch_depth(), 0);
    }

    #[tokio::test]
    async fn test_competing_consumers_split_messages() {
        let bus = InMemoryCommandBus::new();
        let mut a = bus.dispatch_stream().await.unwrap();
        let mut b = bus.dispatch_stream().await.unwrap();

        for _ in 0..4 {
            bus.publish_dispatch(&DispatchMessage::new(JobId::new()))
                .await
                .unwrap();
        }

        let mut received = 0;
        for _ in 0..4 {
            tokio::select! {
                Some(Ok(_)) = a.next() => received += 1,
                Some(Ok(_)) = b.next() => received += 1,
            }
        }
        assert_eq!(received, 4);
        assert_eq!(bus.dispatch_depth(), 0);
    }

    #[tokio::test]
    async fn test_control_signal_reaches_subscriber() {
        let bus = InMemoryCommandBus::new();
        let job_id = JobId::new();

        let mut stream = bus.control_stream(&job_id).await.unwrap();
        bus.publish_control(&ControlSignal::cancel(job_id.clone()))
            .await
            .unwrap();

        let signal = stream.next().await.unwrap().unwrap();
        assert_eq!(signal.kind, ControlKind::Cancel);
        assert_eq!(signal.job_id, job_id);
    }

    #[tokio::test]
    async fn test_control_signal_without_subscriber_is_dropped() {
        let bus = InMemoryCommandBus::new();
        // Must not error: the store write is the durable side
        bus.publish_control(&ControlSignal::pause(JobId::new()))
            .await
            .unwrap();
    }
}
