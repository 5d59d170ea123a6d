//! # Consumer Engine
//!
//! Attaches a [`MessageHandler`] to a queue and keeps feeding it envelopes
//! until cancelled.
//!
//! Each attachment runs two background tasks sharing one [`QueueContext`]:
//!
//! - the **notification loop** first drains any backlog left before the
//!   consumer attached, then pops one envelope per wake-up notification;
//!   when the subscription closes it re-subscribes every `resubscribe_delay`
//! - the **fallback loop** wakes every `fallback_interval`, pops one envelope
//!   and, when it finds one, drains the rest of the backlog; it catches work
//!   whose notification was missed
//!
//! Errors inside the loops (store failures, malformed envelopes, handler
//! failures) are logged and the loops carry on. They are never surfaced to
//! the caller of [`consume`].
//!
//! In [`AckMode::PendingList`] every pop atomically moves the raw entry to
//! `queue:<name>:processing`, and the entry is removed once its delivery
//! reaches an outcome. Entries stranded there by a crash are returned to the
//! queue by [`recover_pending`].

use crate::error::{HandlerError, QueueError};
use crate::message::{Envelope, MessageId, MessageStatus, QueueName};
use crate::provider::{BackingStore, Subscription};
use crate::queue::{self, QueueOptions};
use crate::retry::{self, RetryOutcome, RetryPolicy};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default interval between fallback scans
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_secs(5);

/// Default time [`ConsumerHandle::shutdown`] waits for each loop
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause before re-subscribing after the notification channel closes
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Handler
// ============================================================================

/// User-supplied processing logic
///
/// Any error return, or a panic, counts as a processing failure and sends the
/// envelope through retry resolution.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one payload; non-object payloads arrive wrapped as `{"data": ..}`
    async fn process(&self, payload: Value) -> Result<(), HandlerError>;
}

/// [`MessageHandler`] backed by an async closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`]
///
/// ```rust
/// use bizzmq::consumer::handler_fn;
/// use bizzmq::HandlerError;
///
/// let handler = handler_fn(|payload| async move {
///     println!("got {payload}");
///     Ok::<(), HandlerError>(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn process(&self, payload: Value) -> Result<(), HandlerError> {
        (self.f)(payload).await
    }
}

// ============================================================================
// Options
// ============================================================================

/// How popped entries are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Pop removes the entry; a crash mid-delivery loses it
    #[default]
    Destructive,
    /// Pop moves the entry to the queue's pending list until its delivery ends
    PendingList,
}

/// Per-attachment consumer settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerOptions {
    pub fallback_interval: Duration,
    pub ack_mode: AckMode,
    pub retry_policy: RetryPolicy,
    /// How long [`ConsumerHandle::shutdown`] waits for each loop to exit
    pub shutdown_timeout: Duration,
    /// Pause between attempts to restore a closed notification subscription
    pub resubscribe_delay: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
            ack_mode: AckMode::Destructive,
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }
}

impl ConsumerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback_interval(mut self, interval: Duration) -> Self {
        self.fallback_interval = interval;
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Final outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Handler succeeded; the envelope is discarded
    Processed,
    /// Handler failed; the envelope went back onto the queue
    Requeued { retry_count: u32 },
    /// Handler failed for the last time; a copy went to the dead-letter queue
    DeadLettered {
        dead_letter_queue: QueueName,
        message_id: MessageId,
    },
    /// Handler failed and the envelope was discarded
    Dropped,
}

/// Everything a consumer's loops share
struct QueueContext {
    store: Arc<dyn BackingStore>,
    queue_name: QueueName,
    /// Queue configuration read when the consumer attached
    queue_options: QueueOptions,
    handler: Arc<dyn MessageHandler>,
    options: ConsumerOptions,
}

impl QueueContext {
    /// Pop the oldest entry, moving it to the pending list in pending-list mode
    async fn take_next(&self) -> Result<Option<String>, QueueError> {
        let list_key = self.queue_name.list_key();
        match self.options.ack_mode {
            AckMode::Destructive => self.store.pop_tail(&list_key).await,
            AckMode::PendingList => {
                self.store
                    .move_tail_to_head(&list_key, &self.queue_name.pending_key())
                    .await
            }
        }
    }

    /// Pop and process one entry; `false` when the queue was empty or unreadable
    async fn process_next(&self) -> bool {
        match self.take_next().await {
            Ok(Some(raw)) => {
                self.deliver(raw).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(queue = %self.queue_name, error = %e, "Failed to pop from queue");
                false
            }
        }
    }

    /// Process entries until the queue is empty or the consumer is cancelled
    async fn drain(&self, cancel: &CancellationToken) -> usize {
        let mut processed = 0;
        while !cancel.is_cancelled() && self.process_next().await {
            processed += 1;
        }
        if processed > 0 {
            debug!(queue = %self.queue_name, processed = processed, "Drain pass complete");
        }
        processed
    }

    /// Run one raw entry through processing, then acknowledge it
    async fn deliver(&self, raw: String) {
        match self.process_envelope(raw.as_bytes()).await {
            Ok(outcome) => {
                debug!(queue = %self.queue_name, outcome = ?outcome, "Delivery complete");
            }
            Err(e) => {
                error!(queue = %self.queue_name, error = %e, "Message dropped");
            }
        }

        if self.options.ack_mode == AckMode::PendingList {
            if let Err(e) = self.store.remove(&self.queue_name.pending_key(), &raw).await {
                warn!(
                    queue = %self.queue_name,
                    error = %e,
                    "Failed to acknowledge pending entry, it will be redelivered on recovery"
                );
            }
        }
    }

    async fn process_envelope(&self, raw: &[u8]) -> Result<DeliveryOutcome, QueueError> {
        let mut envelope = Envelope::deserialize(raw)?;
        envelope.transition(MessageStatus::Processing)?;

        let message_id = envelope.message_id.clone();
        debug!(
            queue = %self.queue_name,
            message_id = %message_id,
            retry_count = envelope.retry_count(),
            "Processing message"
        );

        let handled = AssertUnwindSafe(self.handler.process(envelope.handler_payload()))
            .catch_unwind()
            .await;

        let failure = match handled {
            Ok(Ok(())) => {
                envelope.transition(MessageStatus::Processed)?;
                info!(queue = %self.queue_name, message_id = %message_id, "Message processed");
                return Ok(DeliveryOutcome::Processed);
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        envelope.transition(MessageStatus::Failed)?;
        let cause = QueueError::ProcessingFailure {
            message_id: message_id.to_string(),
            message: failure,
        };
        warn!(
            queue = %self.queue_name,
            message_id = %message_id,
            retry_count = envelope.retry_count(),
            error = %cause,
            "Message processing failed"
        );

        // Without a dead-letter queue a failure is final
        if !self.queue_options.dead_letter_enabled {
            warn!(
                queue = %self.queue_name,
                message_id = %message_id,
                "No dead-letter queue configured, failed message dropped without retry"
            );
            return Ok(DeliveryOutcome::Dropped);
        }

        let outcome = retry::requeue_message(
            &self.store,
            &self.queue_name,
            envelope,
            &cause,
            &self.options.retry_policy,
        )
        .await?;

        Ok(match outcome {
            RetryOutcome::Requeued { retry_count, .. } => DeliveryOutcome::Requeued { retry_count },
            RetryOutcome::DeadLettered {
                dead_letter_queue,
                message_id,
            } => DeliveryOutcome::DeadLettered {
                dead_letter_queue,
                message_id,
            },
            RetryOutcome::Discarded => DeliveryOutcome::Dropped,
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Attachment
// ============================================================================

/// Handle to a running consumer
///
/// Dropping the handle cancels the consumer without waiting for it.
#[derive(Debug)]
pub struct ConsumerHandle {
    queue_name: QueueName,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ConsumerHandle {
    /// Queue this consumer is attached to
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Signal both loops to stop without waiting for them
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this consumer, for tying it to a wider shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel both loops and wait for them to exit.
    ///
    /// An in-flight handler runs to completion first. Once this returns no
    /// further handler invocations happen for this consumer.
    pub async fn shutdown(mut self) -> Result<(), QueueError> {
        self.cancel.cancel();

        let mut result = Ok(());
        for task in std::mem::take(&mut self.tasks) {
            match tokio::time::timeout(self.shutdown_timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(queue = %self.queue_name, error = %e, "Consumer task panicked");
                    result = Err(QueueError::InvalidState {
                        message: format!("consumer task for {} panicked", self.queue_name),
                    });
                }
                Err(_) => {
                    warn!(queue = %self.queue_name, "Consumer task did not stop within timeout");
                    result = Err(QueueError::InvalidState {
                        message: format!(
                            "consumer for {} did not stop within {:?}",
                            self.queue_name, self.shutdown_timeout
                        ),
                    });
                }
            }
        }

        info!(queue = %self.queue_name, "Consumer stopped");
        result
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Attach `handler` to a queue.
///
/// The queue configuration is read once here and shared by both loops. The
/// notification subscription is established before this returns, so a
/// subscription failure is reported to the caller; everything after that is
/// handled inside the loops.
pub async fn consume(
    store: Arc<dyn BackingStore>,
    queue_name: &QueueName,
    handler: Arc<dyn MessageHandler>,
    options: ConsumerOptions,
) -> Result<ConsumerHandle, QueueError> {
    if options.fallback_interval.is_zero() {
        return Err(QueueError::InvalidArgument {
            field: "fallback_interval".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if options.resubscribe_delay.is_zero() {
        return Err(QueueError::InvalidArgument {
            field: "resubscribe_delay".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    let queue_options = queue::get_queue_config(store.as_ref(), queue_name).await?;
    let subscription = store.subscribe(&queue_name.list_key()).await?;

    let shutdown_timeout = options.shutdown_timeout;
    let ctx = Arc::new(QueueContext {
        store,
        queue_name: queue_name.clone(),
        queue_options,
        handler,
        options,
    });
    let cancel = CancellationToken::new();

    let notification_task = tokio::spawn(notification_loop(
        Arc::clone(&ctx),
        subscription,
        cancel.clone(),
    ));
    let fallback_task = tokio::spawn(fallback_loop(Arc::clone(&ctx), cancel.clone()));

    info!(
        queue = %queue_name,
        dead_letter_enabled = queue_options.dead_letter_enabled,
        max_retries = queue_options.max_retries,
        ack_mode = ?ctx.options.ack_mode,
        "Consumer started"
    );

    Ok(ConsumerHandle {
        queue_name: queue_name.clone(),
        cancel,
        tasks: vec![notification_task, fallback_task],
        shutdown_timeout,
    })
}

async fn notification_loop(
    ctx: Arc<QueueContext>,
    mut subscription: Subscription,
    cancel: CancellationToken,
) {
    // Backlog published before the consumer attached
    ctx.drain(&cancel).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notification = subscription.next_message() => match notification {
                Some(message_id) => {
                    debug!(queue = %ctx.queue_name, message_id = %message_id, "Notification received");
                    ctx.process_next().await;
                }
                None => {
                    warn!(
                        queue = %ctx.queue_name,
                        "Notification channel closed, re-subscribing"
                    );
                    match resubscribe(&ctx, &cancel).await {
                        Some(restored) => {
                            subscription = restored;
                            // Work published while disconnected has no notification
                            ctx.drain(&cancel).await;
                        }
                        None => break,
                    }
                }
            },
        }
    }

    debug!(queue = %ctx.queue_name, "Notification loop stopped");
}

/// Retry the subscription every `resubscribe_delay` until it succeeds.
///
/// Returns `None` once the consumer is cancelled. The fallback loop keeps
/// delivering in the meantime.
async fn resubscribe(ctx: &QueueContext, cancel: &CancellationToken) -> Option<Subscription> {
    let channel = ctx.queue_name.list_key();
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(ctx.options.resubscribe_delay) => {}
        }

        attempt += 1;
        match ctx.store.subscribe(&channel).await {
            Ok(subscription) => {
                info!(queue = %ctx.queue_name, attempt = attempt, "Notification subscription restored");
                return Some(subscription);
            }
            Err(e) => {
                error!(
                    queue = %ctx.queue_name,
                    attempt = attempt,
                    error = %e,
                    "Failed to restore notification subscription"
                );
            }
        }
    }
}

async fn fallback_loop(ctx: Arc<QueueContext>, cancel: CancellationToken) {
    let period = ctx.options.fallback_interval;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if ctx.process_next().await {
                    debug!(queue = %ctx.queue_name, "Fallback scan found missed work");
                    ctx.drain(&cancel).await;
                }
            }
        }
    }

    debug!(queue = %ctx.queue_name, "Fallback loop stopped");
}

/// Return entries stranded in a queue's pending list to the queue.
///
/// Each entry is moved atomically, oldest first, and rejoins the queue at the
/// publish end like any requeued envelope. Only meaningful for consumers
/// running in [`AckMode::PendingList`]; it must not run while such a consumer
/// is live on the same queue.
pub async fn recover_pending(
    store: &dyn BackingStore,
    queue_name: &QueueName,
) -> Result<usize, QueueError> {
    let pending_key = queue_name.pending_key();
    let list_key = queue_name.list_key();

    let mut recovered = 0;
    while let Some(raw) = store.move_tail_to_head(&pending_key, &list_key).await? {
        recovered += 1;
        if let Ok(envelope) = Envelope::deserialize(raw.as_bytes()) {
            crate::producer::notify(store, queue_name, &envelope.message_id).await;
        }
    }

    if recovered > 0 {
        info!(queue = %queue_name, recovered = recovered, "Pending entries recovered");
    }
    Ok(recovered)
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
