//! NATS command bus implementation.
//!
//! Dispatch messages ride a JetStream work-queue stream: every message is
//! delivered to exactly one of the worker replicas pulling from the shared
//! durable consumer, with at-least-once redelivery until acked. Control
//! signals use plain core subjects — they are a latency optimization on
//! top of the authoritative job record, so lossy delivery is acceptable.

use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use jobbot_domain::command_bus::{CommandBus, CommandBusError};
use jobbot_domain::messages::{ControlSignal, DispatchMessage};
use jobbot_shared::config::MessagingConfig;
use jobbot_shared::subjects::{control_subject, DISPATCH_CONSUMER, DISPATCH_STREAM, DISPATCH_SUBJECT};
use jobbot_shared::JobId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// NATS connection configuration with production defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URLs
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connection_timeout_secs: u64,
    /// Max reconnection attempts (None = infinite)
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: Option<usize>,
    /// Client connection name
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            connection_timeout_secs: default_connect_timeout(),
            max_reconnects: default_max_reconnects(),
            name: None,
        }
    }
}

fn default_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

const fn default_connect_timeout() -> u64 {
    5
}

fn default_max_reconnects() -> Option<usize> {
    Some(5)
}

impl NatsConfig {
    pub fn from_messaging(config: &MessagingConfig, name: &str) -> Self {
        Self {
            urls: config.nats_urls.clone(),
            connection_timeout_secs: config.connection_timeout_secs,
            max_reconnects: Some(5),
            name: Some(name.to_string()),
        }
    }

    /// Primary URL used for the connection
    pub fn primary_url(&self) -> &str {
        self.urls
            .first()
            .map(|s| s.as_str())
            .unwrap_or("nats://localhost:4222")
    }
}

#[derive(Clone)]
pub struct NatsCommandBus {
    client: Client,
    jetstream: JetStreamContext,
}

impl NatsCommandBus {
    /// Connects to NATS and ensures the dispatch stream exists
    pub async fn new(config: NatsConfig) -> Result<Self, CommandBusError> {
        let mut connect_options = ConnectOptions::default()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs));

        if let Some(name) = &config.name {
            connect_options = connect_options.name(name);
        }

        if let Some(max_reconnects) = config.max_reconnects {
            connect_options = connect_options.max_reconnects(max_reconnects);
        }

        let client = async_nats::connect_with_options(config.primary_url(), connect_options)
            .await
            .map_err(|e| CommandBusError::ConnectionError(e.to_string()))?;

        let jetstream = async_nats::jetstream::new(client.clone());

        let bus = Self { client, jetstream };
        bus.ensure_dispatch_stream().await?;
        Ok(bus)
    }

    /// Creates the dispatch work-queue stream if it does not exist yet
    async fn ensure_dispatch_stream(
        &self,
    ) -> Result<async_nats::jetstream::stream::Stream, CommandBusError> {
        if let Ok(stream) = self.jetstream.get_stream(DISPATCH_STREAM).await {
            debug!("Stream {} already exists", DISPATCH_STREAM);
            return Ok(stream);
        }

        info!(
            "Creating stream {} for subject {}",
            DISPATCH_STREAM, DISPATCH_SUBJECT
        );

        let stream_config = StreamConfig {
            name: DISPATCH_STREAM.to_string(),
            subjects: vec![DISPATCH_SUBJECT.to_string()],
            retention: async_nats::jetstream::stream::RetentionPolicy::WorkQueue,
            max_age: Duration::from_secs(24 * 60 * 60),
            storage: async_nats::jetstream::stream::StorageType::File,
            num_replicas: 1,
            discard: async_nats::jetstream::stream::DiscardPolicy::Old,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .map_err(|e| CommandBusError::ConnectionError(e.to_string()))
    }

    /// Gets or creates the durable pull consumer shared by worker replicas
    async fn dispatch_consumer(&self) -> Result<PullConsumer, CommandBusError> {
        let mut stream = self.ensure_dispatch_stream().await?;

        if let Ok(consumer) = stream.get_consumer(DISPATCH_CONSUMER).await {
            debug!("Consumer {} already exists", DISPATCH_CONSUMER);
            return Ok(consumer);
        }

        info!("Creating consumer {}", DISPATCH_CONSUMER);

        let consumer_config = PullConsumerConfig {
            durable_name: Some(DISPATCH_CONSUMER.to_string()),
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(30),
            max_deliver: 5,
            ..Default::default()
        };

        stream
            .create_consumer(consumer_config)
            .await
            .map_err(|e| CommandBusError::SubscribeError(e.to_string()))
    }
}

#[async_trait]
impl CommandBus for NatsCommandBus {
    #[instrument(skip(self, message), fields(job_id = %message.job_id))]
    async fn publish_dispatch(&self, message: &DispatchMessage) -> Result<(), CommandBusError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| CommandBusError::SerializationError(e.to_string()))?;

        // Wait for the JetStream ack so the message is stored before the
        // submit call returns
        let ack = self
            .jetstream
            .publish(DISPATCH_SUBJECT.to_string(), payload.into())
            .await
            .map_err(|e| CommandBusError::PublishError(e.to_string()))?;

        ack.await
            .map_err(|e| CommandBusError::PublishError(e.to_string()))?;

        debug!("Published dispatch message");
        Ok(())
    }

    #[instrument(skip(self, signal), fields(job_id = %signal.job_id, kind = %signal.kind))]
    async fn publish_control(&self, signal: &ControlSignal) -> Result<(), CommandBusError> {
        let payload = serde_json::to_vec(signal)
            .map_err(|e| CommandBusError::SerializationError(e.to_string()))?;

        self.client
            .publish(control_subject(&signal.job_id), payload.into())
            .await
            .map_err(|e| CommandBusError::PublishError(e.to_string()))?;

        self.client
            .flush()
            .await
            .map_err(|e| CommandBusError::PublishError(e.to_string()))?;

        debug!("Published control signal");
        Ok(())
    }

    async fn dispatch_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<DispatchMessage, CommandBusError>>, CommandBusError>
    {
        let consumer = self.dispatch_consumer().await?;

        let stream = async_stream::stream! {
            let mut messages = match consumer.messages().await {
                Ok(msgs) => msgs,
                Err(e) => {
                    error!("Failed to get consumer messages: {}", e);
                    yield Err(CommandBusError::ConnectionError(e.to_string()));
                    return;
                }
            };

            while let Some(result) = messages.next().await {
                match result {
                    Ok(message) => {
                        let decoded: Result<DispatchMessage, _> =
                            serde_json::from_slice(&message.payload);

                        // Ack either way: a poison message must not be
                        // redelivered forever, and a decoded one is about
                        // to be handled (the claim CAS absorbs duplicates
                        // if the handler dies first).
                        if let Err(ack_err) = message.ack().await {
                            warn!("Failed to ack dispatch message: {}", ack_err);
                        }

                        match decoded {
                            Ok(dispatch) => yield Ok(dispatch),
                            Err(e) => {
                                error!("Failed to deserialize dispatch message: {}", e);
                                yield Err(CommandBusError::SerializationError(e.to_string()));
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error receiving dispatch message: {}", e);
                        yield Err(CommandBusError::ConnectionError(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn control_stream(
        &self,
        job_id: &JobId,
    ) -> Result<BoxStream<'static, Result<ControlSignal, CommandBusError>>, CommandBusError> {
        let subscriber = self
            .client
            .subscribe(control_subject(job_id))
            .await
            .map_err(|e| CommandBusError::SubscribeError(e.to_string()))?;

        let stream = subscriber.map(|message| {
            serde_json::from_slice::<ControlSignal>(&message.payload)
                .map_err(|e| CommandBusError::SerializationError(e.to_string()))
        });

        Ok(Box::pin(stream))
    }
}
