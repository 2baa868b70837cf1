// Error types shared by the queue, storage and worker layers

use thiserror::Error;

/// Queue-related errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to queue: {0}")]
    Connection(String),

    #[error("Failed to create stream: {0}")]
    StreamCreation(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Failed to create consumer: {0}")]
    ConsumerCreation(String),

    #[error("Failed to consume message: {0}")]
    ConsumeFailed(String),

    /// The fetch was interrupted because the caller's cancellation token fired.
    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Failed to acknowledge message: {0}")]
    AckFailed(String),
}

impl QueueError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }
}

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("MinIO error: {0}")]
    MinioError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status} for '{path}'")]
    UnexpectedStatus { path: String, status: u16 },

    #[error("Object '{0}' is empty")]
    EmptyObject(String),
}

/// Storage change event decoding errors
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed event payload: {0}")]
    Malformed(String),
}

/// Worker lifecycle errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker '{0}' is already running")]
    AlreadyStarted(String),

    #[error("Worker '{0}' has been stopped and cannot be restarted")]
    Stopped(String),
}
