//! Command bus port.
//!
//! Carries dispatch messages (new job → some worker) and control signals
//! (pause/cancel → the owning worker). Dispatch delivery is at-least-once;
//! duplicate messages must be ignorable by consumers.

use crate::messages::{ControlSignal, DispatchMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use jobbot_shared::JobId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandBusError {
    #[error("Failed to publish message: {0}")]
    PublishError(String),
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Publishes a dispatch message for a pending job
    async fn publish_dispatch(&self, message: &DispatchMessage) -> Result<(), CommandBusError>;

    /// Publishes a control signal targeted at a specific job
    async fn publish_control(&self, signal: &ControlSignal) -> Result<(), CommandBusError>;

    /// Stream of dispatch messages. Replicas subscribing to this stream
    /// compete for messages: each message is delivered to one of them, with
    /// at-least-once semantics.
    async fn dispatch_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<DispatchMessage, CommandBusError>>, CommandBusError>;

    /// Stream of control signals for one job, subscribed by its owner after
    /// claiming
    async fn control_stream(
        &self,
        job_id: &JobId,
    ) -> Result<BoxStream<'static, Result<ControlSignal, CommandBusError>>, CommandBusError>;
}

impl From<CommandBusError> for crate::error::DomainError {
    fn from(err: CommandBusError) -> Self {
        crate::error::DomainError::BusUnavailable {
            message: err.to_string(),
        }
    }
}
