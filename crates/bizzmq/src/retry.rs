//! # Retry and Dead-Letter Resolution
//!
//! Decides what happens to an envelope whose handler failed: redeliver it on
//! the same queue with an incremented retry count, or, once the queue's retry
//! budget is spent, publish it into the queue's dead-letter queue.
//!
//! Redelivery timing is governed by a [`RetryPolicy`]. The default policy
//! redelivers immediately; fixed and exponential backoff (with optional jitter)
//! delay the push without blocking the consumer that reported the failure.

use crate::error::{ConfigurationError, QueueError};
use crate::message::{Envelope, MessageId, MessageStatus, QueueName, Timestamp};
use crate::provider::BackingStore;
use crate::{producer, queue};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// ============================================================================
// Retry Policy
// ============================================================================

/// How the delay before a redelivery grows with the retry count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Push the envelope back right away
    #[default]
    Immediate,
    /// Always wait `initial_delay_ms`
    Fixed,
    /// Wait `initial_delay_ms * multiplier^(retry - 1)`, capped at `max_delay_ms`
    Exponential,
}

/// Redelivery timing policy
///
/// # Examples
///
/// ```rust
/// use bizzmq::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: immediate redelivery
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.calculate_delay(1), Duration::ZERO);
///
/// // 100ms, 200ms, 400ms ... capped at 2s
/// let policy = RetryPolicy::exponential(100, 2_000, 2.0).without_jitter();
/// assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub backoff: BackoffStrategy,

    /// Delay before the first redelivery
    pub initial_delay_ms: u64,

    /// Maximum delay between redeliveries
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::Immediate,
            initial_delay_ms: 1_000,
            max_delay_ms: 16_000,
            backoff_multiplier: 2.0,
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Redeliver immediately
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Wait the same delay before every redelivery
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            backoff: BackoffStrategy::Fixed,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            ..Self::default()
        }
    }

    /// Exponential backoff with ±25% jitter
    pub fn exponential(initial_delay_ms: u64, max_delay_ms: u64, backoff_multiplier: f64) -> Self {
        Self {
            backoff: BackoffStrategy::Exponential,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.use_jitter = true;
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate the delay before redelivery number `retry_count` (1-based)
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let base_ms = match self.backoff {
            BackoffStrategy::Immediate => return Duration::ZERO,
            BackoffStrategy::Fixed => self.initial_delay_ms as f64,
            BackoffStrategy::Exponential => {
                let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
                self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent)
            }
        };

        let capped_ms = base_ms.min(self.max_delay_ms as f64);

        let final_ms = if self.use_jitter {
            Self::add_jitter(capped_ms, self.jitter_percent)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms.max(0.0).round() as u64)
    }

    /// Check the policy for values that cannot produce sensible delays
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.backoff == BackoffStrategy::Exponential && self.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::Invalid {
                message: "retry.backoff_multiplier must be at least 1.0".to_string(),
            });
        }
        if self.max_delay_ms < self.initial_delay_ms && self.backoff != BackoffStrategy::Immediate
        {
            return Err(ConfigurationError::Invalid {
                message: "retry.max_delay_ms must not be smaller than retry.initial_delay_ms"
                    .to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_percent) {
            return Err(ConfigurationError::Invalid {
                message: "retry.jitter_percent must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Applies random variation in range [delay * (1-jitter), delay * (1+jitter)]
    fn add_jitter(delay_ms: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_ms * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_ms;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        (delay_ms + jitter).max(0.0)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// What the resolver did with a failed envelope
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// Pushed back onto the same queue (possibly after `delay`)
    Requeued {
        retry_count: u32,
        max_retries: u32,
        delay: Duration,
    },

    /// Published as a fresh message into the dead-letter queue
    DeadLettered {
        dead_letter_queue: QueueName,
        message_id: MessageId,
    },

    /// Dropped because the queue has no dead-letter queue
    Discarded,
}

/// Redeliver a failed envelope, or dead-letter it once retries are exhausted.
///
/// The retry budget is re-read from the queue record on every call rather than
/// taken from the consumer's snapshot. The envelope must be in the `failed`
/// state.
pub async fn requeue_message(
    store: &Arc<dyn BackingStore>,
    queue_name: &QueueName,
    mut envelope: Envelope,
    cause: &QueueError,
    policy: &RetryPolicy,
) -> Result<RetryOutcome, QueueError> {
    let max_retries = queue::get_queue_config(store.as_ref(), queue_name)
        .await?
        .max_retries;

    let retry_count = envelope.retry_count().saturating_add(1);
    if retry_count > max_retries {
        return move_to_dead_letter(store.as_ref(), queue_name, envelope, cause).await;
    }

    envelope.options.retry_count = retry_count;
    envelope.options.timestamp_updated = Some(Timestamp::now());
    envelope.transition(MessageStatus::Requeued)?;
    let raw = envelope.serialize()?;
    let delay = policy.calculate_delay(retry_count);

    if delay.is_zero() {
        store.push_head(&queue_name.list_key(), &raw).await?;
        producer::notify(store.as_ref(), queue_name, &envelope.message_id).await;
    } else {
        let store = Arc::clone(store);
        let queue_name = queue_name.clone();
        let message_id = envelope.message_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.push_head(&queue_name.list_key(), &raw).await {
                Ok(_) => producer::notify(store.as_ref(), &queue_name, &message_id).await,
                Err(e) => error!(
                    queue = %queue_name,
                    message_id = %message_id,
                    error = %e,
                    "Delayed requeue failed, message lost"
                ),
            }
        });
    }

    warn!(
        queue = %queue_name,
        message_id = %envelope.message_id,
        retry_count = retry_count,
        max_retries = max_retries,
        delay_ms = delay.as_millis() as u64,
        "Message requeued for retry"
    );

    Ok(RetryOutcome::Requeued {
        retry_count,
        max_retries,
        delay,
    })
}

/// Publish a failed envelope into `<queue>_dlq` with failure metadata attached.
///
/// Discards the envelope when the queue's dead-letter queue is disabled.
pub async fn move_to_dead_letter(
    store: &dyn BackingStore,
    queue_name: &QueueName,
    envelope: Envelope,
    cause: &QueueError,
) -> Result<RetryOutcome, QueueError> {
    let options = queue::get_queue_config(store, queue_name).await?;
    if !options.dead_letter_enabled {
        warn!(
            queue = %queue_name,
            message_id = %envelope.message_id,
            "No dead-letter queue configured, failed message discarded"
        );
        return Ok(RetryOutcome::Discarded);
    }

    let dead_letter_queue = queue_name.dead_letter();
    // Records written before the dead-letter queue was created alongside its parent
    queue::ensure_queue(store, &dead_letter_queue).await?;

    let failed_retries = envelope.retry_count();
    let message_options = envelope
        .options
        .clone()
        .with_failure(queue_name, cause.to_string());

    let message_id =
        producer::publish_message(store, &dead_letter_queue, envelope.payload, message_options)
            .await?;

    info!(
        queue = %queue_name,
        dead_letter_queue = %dead_letter_queue,
        original_message_id = %envelope.message_id,
        message_id = %message_id,
        retry_count = failed_retries,
        "Message moved to dead-letter queue"
    );

    Ok(RetryOutcome::DeadLettered {
        dead_letter_queue,
        message_id,
    })
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
