// Shared client bundle handed to every worker task

use crate::queue::MessageQueue;
use crate::storage::ObjectStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Already-initialized clients shared by all workers.
/// Both clients are safe for concurrent use; each worker opens its own consumer.
#[derive(Clone)]
pub struct Dependencies {
    pub queue: Arc<dyn MessageQueue>,
    pub storage: Arc<dyn ObjectStore>,
}

impl Dependencies {
    pub fn new(queue: Arc<dyn MessageQueue>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { queue, storage }
    }

    /// Release the queue connection. Call after every worker has stopped.
    pub async fn close(&self) {
        info!("Closing queue connection");
        if let Err(e) = self.queue.close().await {
            warn!(error = %e, "Failed to close queue connection cleanly");
        }
    }
}
