// NATS JetStream implementation of the consumer-group queue
//
// Topics map to JetStream streams and consumer groups map to durable pull
// consumers with explicit acknowledgement, so committing a message is an ack.

use crate::config;
use crate::errors::QueueError;
use crate::queue::{EventConsumer, MessageQueue, QueueMessage};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream::{Config as StreamConfig, RetentionPolicy, Stream},
    Context as JetStreamContext,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// NATS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,
    /// Subject bucket notifications are published on
    pub subject: String,
    /// Maximum age for messages in the stream (in seconds)
    pub max_age_seconds: u64,
    /// Maximum number of delivery attempts per message
    pub max_deliver: i64,
    /// How long an uncommitted message stays invisible before redelivery
    pub ack_wait_seconds: u64,
    /// Connection attempts made at startup, one second apart
    pub connect_attempts: u32,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject: "minio.events".to_string(),
            max_age_seconds: 86400, // 24 hours
            max_deliver: 10,
            ack_wait_seconds: 60,
            connect_attempts: 3,
        }
    }
}

impl From<&config::NatsConfig> for NatsConfig {
    fn from(settings: &config::NatsConfig) -> Self {
        Self {
            url: settings.url.clone(),
            subject: settings.subject.clone(),
            max_age_seconds: settings.max_age_seconds,
            max_deliver: settings.max_deliver,
            ack_wait_seconds: settings.ack_wait_seconds,
            connect_attempts: settings.connect_attempts,
        }
    }
}

/// NATS JetStream client
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: JetStreamContext,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to the NATS server, retrying up to `connect_attempts` times
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn new(config: NatsConfig) -> Result<Self, QueueError> {
        info!("Connecting to NATS server");

        let attempts = config.connect_attempts.max(1);
        let mut attempt = 0;
        let client = loop {
            attempt += 1;
            match async_nats::connect(&config.url).await {
                Ok(client) => break client,
                Err(e) if attempt < attempts => {
                    warn!(
                        error = %e,
                        attempts_left = attempts - attempt,
                        "NATS connectivity check failed"
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    return Err(QueueError::Connection(format!(
                        "Failed to connect to NATS after {} attempts: {}",
                        attempts, e
                    )));
                }
            }
        };

        info!("Connected to NATS server successfully");

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Create the stream backing `topic` if it does not exist yet
    #[instrument(skip(self))]
    pub async fn initialize_stream(&self, topic: &str) -> Result<Stream, QueueError> {
        info!(subject = %self.config.subject, "Initializing JetStream stream");

        let stream_config = StreamConfig {
            name: topic.to_string(),
            subjects: vec![self.config.subject.clone()],
            retention: RetentionPolicy::Limits,
            max_age: Duration::from_secs(self.config.max_age_seconds),
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| QueueError::StreamCreation(format!("Failed to create stream: {}", e)))?;

        info!("Stream initialized successfully");
        Ok(stream)
    }
}

#[async_trait]
impl MessageQueue for NatsClient {
    #[instrument(skip(self))]
    async fn open_consumer(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn EventConsumer>, QueueError> {
        let stream = self
            .jetstream
            .get_stream(topic)
            .await
            .map_err(|e| QueueError::StreamNotFound(format!("Stream '{}' not found: {}", topic, e)))?;

        let consumer_config = pull::Config {
            durable_name: Some(group_id.to_string()),
            ack_policy: AckPolicy::Explicit,
            max_deliver: self.config.max_deliver,
            ack_wait: Duration::from_secs(self.config.ack_wait_seconds),
            ..Default::default()
        };

        let consumer: PullConsumer = stream
            .get_or_create_consumer(group_id, consumer_config)
            .await
            .map_err(|e| {
                QueueError::ConsumerCreation(format!("Failed to create consumer: {}", e))
            })?;

        info!("Consumer created successfully");

        Ok(Box::new(NatsEventConsumer::new(consumer)))
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.client
            .flush()
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to flush NATS client: {}", e)))
    }
}

/// The last fetched message, held until it is committed or replaced.
///
/// Messages are handled one at a time, so a message still held when the next
/// one arrives was deliberately left uncommitted and is released to the
/// broker's redelivery timer.
struct InFlight<M> {
    slot: Option<(u64, M)>,
}

impl<M> InFlight<M> {
    fn new() -> Self {
        Self { slot: None }
    }

    /// Hold `message`, returning the offset of any message it displaced
    fn hold(&mut self, offset: u64, message: M) -> Option<u64> {
        self.slot
            .replace((offset, message))
            .map(|(displaced, _)| displaced)
    }

    /// Take the held message if it is the one at `offset`
    fn take(&mut self, offset: u64) -> Option<M> {
        match self.slot.take() {
            Some((held, message)) if held == offset => Some(message),
            other => {
                self.slot = other;
                None
            }
        }
    }

    fn clear(&mut self) -> Option<u64> {
        self.slot.take().map(|(offset, _)| offset)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        usize::from(self.slot.is_some())
    }
}

/// Durable pull consumer handle
pub struct NatsEventConsumer {
    consumer: PullConsumer,
    messages: Option<pull::Stream>,
    in_flight: InFlight<jetstream::Message>,
}

impl NatsEventConsumer {
    fn new(consumer: PullConsumer) -> Self {
        Self {
            consumer,
            messages: None,
            in_flight: InFlight::new(),
        }
    }
}

#[async_trait]
impl EventConsumer for NatsEventConsumer {
    async fn fetch_next(&mut self, cancel: &CancellationToken) -> Result<QueueMessage, QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        if self.messages.is_none() {
            let messages = self.consumer.messages().await.map_err(|e| {
                QueueError::ConsumeFailed(format!("Failed to create message stream: {}", e))
            })?;
            self.messages = Some(messages);
        }
        let Some(messages) = self.messages.as_mut() else {
            return Err(QueueError::ConsumeFailed(
                "Message stream unavailable".to_string(),
            ));
        };

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            next = messages.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                let offset = message
                    .info()
                    .map_err(|e| {
                        QueueError::ConsumeFailed(format!("Failed to get message info: {}", e))
                    })?
                    .stream_sequence;

                let fetched = QueueMessage {
                    key: message.subject.to_string().into_bytes(),
                    value: message.payload.to_vec(),
                    offset,
                };
                if let Some(displaced) = self.in_flight.hold(offset, message) {
                    debug!(offset = displaced, "Left uncommitted for redelivery");
                }

                debug!(offset, "Message fetched");
                Ok(fetched)
            }
            Some(Err(e)) => Err(QueueError::ConsumeFailed(format!(
                "Error receiving message: {}",
                e
            ))),
            None => {
                // Reopened on the next fetch
                self.messages = None;
                Err(QueueError::ConsumeFailed(
                    "Message stream ended unexpectedly".to_string(),
                ))
            }
        }
    }

    async fn commit(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
        let in_flight = self.in_flight.take(message.offset).ok_or_else(|| {
            QueueError::AckFailed(format!("No in-flight message at offset {}", message.offset))
        })?;

        in_flight
            .ack()
            .await
            .map_err(|e| QueueError::AckFailed(format!("Failed to acknowledge message: {}", e)))
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        if let Some(offset) = self.in_flight.clear() {
            debug!(offset, "Closing consumer with an uncommitted message");
        }
        self.messages = None;
        Ok(())
    }
}
