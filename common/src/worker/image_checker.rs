// Profile image checker: deletes uploaded objects that do not sniff as images
//
// Consumes bucket notifications from the object store. Messages are handled
// strictly one at a time; the offset of each message is committed before the
// next one is fetched.

use crate::event::StorageEvent;
use crate::queue::{EventConsumer, QueueMessage};
use crate::sniff::{detect_content_type, is_image, SNIFF_LEN};
use crate::storage::ObjectStore;
use crate::telemetry;
use crate::worker::{Dependencies, WorkerTask};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const WORKER_NAME: &str = "profile-image-checker";

/// Topic the object store publishes bucket notifications to
pub const TOPIC: &str = "minio-events";
pub const GROUP_ID: &str = "profile-image-checker";

/// What happened to a single storage event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Payload could not be decoded; left uncommitted for redelivery
    Malformed,
    /// Not an object creation event
    Skipped,
    /// Object sniffed as an image and was kept
    Retained,
    /// Object sniffed as something else and was deleted
    Removed,
    /// Object could not be read or deleted; left in place
    Unresolved,
}

impl MessageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOutcome::Malformed => "malformed",
            MessageOutcome::Skipped => "skipped",
            MessageOutcome::Retained => "retained",
            MessageOutcome::Removed => "removed",
            MessageOutcome::Unresolved => "unresolved",
        }
    }

    /// Every handled message is committed except undecodable ones.
    ///
    /// `Unresolved` is committed too (fail-open): the object is not re-checked
    /// unless the same event is delivered again.
    pub fn should_commit(&self) -> bool {
        !matches!(self, MessageOutcome::Malformed)
    }
}

/// The image checker as a worker task
pub fn task() -> WorkerTask {
    Arc::new(|cancel: CancellationToken, deps: Arc<Dependencies>| run(cancel, deps).boxed())
}

/// Consume storage events until `cancel` fires.
///
/// Returns early, without retrying, if the consumer cannot be opened. Once
/// opened, the consumer is closed on every exit path; a panic is re-raised
/// after the close.
pub async fn run(cancel: CancellationToken, deps: Arc<Dependencies>) {
    let mut consumer = match deps.queue.open_consumer(TOPIC, GROUP_ID).await {
        Ok(consumer) => consumer,
        Err(e) => {
            error!(error = %e, topic = TOPIC, group_id = GROUP_ID, "Failed to create consumer");
            return;
        }
    };

    info!(topic = TOPIC, group_id = GROUP_ID, "Starting profile image checker");

    let consumed = AssertUnwindSafe(consume(consumer.as_mut(), &cancel, deps.storage.as_ref()))
        .catch_unwind()
        .await;

    if let Err(e) = consumer.close().await {
        warn!(error = %e, topic = TOPIC, "Failed to close consumer");
    }

    if let Err(panic) = consumed {
        std::panic::resume_unwind(panic);
    }
}

async fn consume(
    consumer: &mut dyn EventConsumer,
    cancel: &CancellationToken,
    storage: &dyn ObjectStore,
) {
    while !cancel.is_cancelled() {
        let message = match consumer.fetch_next(cancel).await {
            Ok(message) => message,
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                error!(error = %e, topic = TOPIC, "Failed to read message");
                telemetry::record_fetch_error();
                tokio::task::yield_now().await;
                continue;
            }
        };

        let outcome = handle_message(&message, storage).await;
        telemetry::record_message_outcome(outcome.as_str());

        if outcome.should_commit() {
            if let Err(e) = consumer.commit(&message).await {
                error!(error = %e, topic = TOPIC, offset = message.offset, "Failed to commit message");
                telemetry::record_commit_error();
            }
        }
    }

    info!(topic = TOPIC, "Cancellation received, stopping consumer");
}

/// Validate the object referenced by one storage event
pub async fn handle_message(message: &QueueMessage, storage: &dyn ObjectStore) -> MessageOutcome {
    let event = match StorageEvent::decode(&message.value) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, offset = message.offset, "Failed to decode storage event");
            return MessageOutcome::Malformed;
        }
    };

    if !event.is_object_created() {
        debug!(
            event_name = %event.event_name,
            key = %event.key,
            "Event not for this consumer"
        );
        return MessageOutcome::Skipped;
    }

    let key = event.object_key(storage.bucket_name());

    let window = match storage.get_object(key, SNIFF_LEN).await {
        Ok(window) if window.is_empty() => {
            warn!(key = %key, "Object is empty, leaving it in place");
            return MessageOutcome::Unresolved;
        }
        Ok(window) => window,
        Err(e) => {
            warn!(error = %e, key = %key, "Failed to read object, leaving it in place");
            return MessageOutcome::Unresolved;
        }
    };

    let content_type = detect_content_type(&window);
    if is_image(content_type) {
        info!(key = %key, content_type, "Image confirmed");
        return MessageOutcome::Retained;
    }

    info!(key = %key, content_type, "Non-image confirmed, deleting");
    match storage.remove_object(key).await {
        Ok(()) => MessageOutcome::Removed,
        Err(e) => {
            error!(error = %e, key = %key, "Failed to remove non-image");
            MessageOutcome::Unresolved
        }
    }
}
