//! Publisher: appends new envelopes to a queue's list.

use crate::error::QueueError;
use crate::message::{Envelope, MessageId, MessageOptions, QueueName};
use crate::provider::BackingStore;
use crate::queue;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Publish a payload to an existing queue.
///
/// The envelope is pushed at the head of `queue:<name>`; consumers pop from
/// the tail. A wake-up notification carrying the message id is then published
/// on the channel of the same name. The notification is best effort: a queue
/// with no listening consumer, or a failed publish, does not fail the call.
///
/// Every publish starts a fresh delivery history, so the retry count of the
/// supplied options is reset to zero.
pub async fn publish_message(
    store: &dyn BackingStore,
    queue_name: &QueueName,
    payload: Value,
    mut options: MessageOptions,
) -> Result<MessageId, QueueError> {
    if !queue::queue_exists(store, queue_name).await? {
        return Err(QueueError::QueueNotFound {
            queue_name: queue_name.as_str().to_string(),
        });
    }

    options.retry_count = 0;
    let envelope = Envelope::new(queue_name, payload, options);
    let raw = envelope.serialize()?;

    store.push_head(&queue_name.list_key(), &raw).await?;
    notify(store, queue_name, &envelope.message_id).await;

    info!(
        queue = %queue_name,
        message_id = %envelope.message_id,
        "Message added to queue"
    );
    Ok(envelope.message_id)
}

/// Signal consumers of `queue_name` that new work is available
pub(crate) async fn notify(store: &dyn BackingStore, queue_name: &QueueName, message_id: &MessageId) {
    match store.publish(&queue_name.list_key(), message_id.as_str()).await {
        Ok(receivers) => {
            debug!(queue = %queue_name, receivers = receivers, "Notification published");
        }
        Err(e) => {
            warn!(
                queue = %queue_name,
                message_id = %message_id,
                error = %e,
                "Failed to publish notification, consumers will pick the message up on their next scan"
            );
        }
    }
}

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;
