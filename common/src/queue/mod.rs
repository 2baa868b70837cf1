// Queue module: consumer-group abstraction over the event log, backed by NATS JetStream

pub mod nats;

pub use nats::{NatsClient, NatsConfig, NatsEventConsumer};

use crate::errors::QueueError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A message fetched from a topic.
///
/// `offset` identifies the message within the consumer that fetched it and is
/// what gets committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub offset: u64,
}

/// Factory for consumers bound to a topic and consumer group.
/// Implementations must be safe to share between workers.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn open_consumer(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn EventConsumer>, QueueError>;

    /// Flush and release the underlying connection
    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// A consumer handle owned by exactly one worker
#[async_trait]
pub trait EventConsumer: Send {
    /// Block until the next message is available.
    ///
    /// Returns `QueueError::Cancelled` promptly once `cancel` fires.
    async fn fetch_next(&mut self, cancel: &CancellationToken) -> Result<QueueMessage, QueueError>;

    /// Advance the group's durable position past `message`
    async fn commit(&mut self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Release the consumer. Uncommitted messages become eligible for redelivery.
    async fn close(&mut self) -> Result<(), QueueError>;
}
