//! Client facade tying a backing store to the queue operations.

use crate::config::BizzMqConfig;
use crate::consumer::{self, ConsumerHandle, MessageHandler};
use crate::error::QueueError;
use crate::message::{MessageId, MessageOptions, QueueName};
use crate::producer;
use crate::provider::{BackingStore, StoreType};
use crate::queue::{self, QueueMetadata, QueueOptions};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Entry point for queue operations
///
/// Holds the shared backing store and the resolved configuration; every
/// operation runs against this context. Queue names are accepted as plain
/// strings and validated on each call.
///
/// # Examples
///
/// ```rust
/// use bizzmq::{BizzMq, BizzMqConfig, InMemoryStore, MessageOptions, QueueOptions};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), bizzmq::QueueError> {
/// let client = BizzMq::new(Arc::new(InMemoryStore::new()), BizzMqConfig::default());
/// client.create_queue("emails", QueueOptions::new().with_dead_letter(true)).await?;
/// let id = client
///     .publish_message("emails", json!({"to": "ops@example.com"}), MessageOptions::new())
///     .await?;
/// # let _ = id;
/// # Ok(())
/// # }
/// ```
pub struct BizzMq {
    store: Arc<dyn BackingStore>,
    config: BizzMqConfig,
    closed: AtomicBool,
}

impl BizzMq {
    /// Create a client over an existing store
    pub fn new(store: Arc<dyn BackingStore>, config: BizzMqConfig) -> Self {
        Self {
            store,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Connect to the Redis instance named by `config.redis_url`
    #[cfg(feature = "redis")]
    pub async fn connect(config: BizzMqConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let store = crate::providers::RedisStore::connect(&config.redis_url).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn config(&self) -> &BizzMqConfig {
        &self.config
    }

    pub fn store_type(&self) -> StoreType {
        self.store.store_type()
    }

    /// Shared handle to the backing store
    pub fn store(&self) -> Arc<dyn BackingStore> {
        Arc::clone(&self.store)
    }

    /// Create a queue; `false` when it already existed and was left untouched
    pub async fn create_queue(&self, name: &str, options: QueueOptions) -> Result<bool, QueueError> {
        self.ensure_open()?;
        let name = parse_name(name)?;
        queue::create_queue(self.store.as_ref(), &name, options).await
    }

    /// Read a queue's configuration, with defaults for absent fields
    pub async fn queue_config(&self, name: &str) -> Result<QueueOptions, QueueError> {
        self.ensure_open()?;
        let name = parse_name(name)?;
        queue::get_queue_config(self.store.as_ref(), &name).await
    }

    /// Read a queue's stored record; `None` when it does not exist
    pub async fn queue_metadata(&self, name: &str) -> Result<Option<QueueMetadata>, QueueError> {
        self.ensure_open()?;
        let name = parse_name(name)?;
        queue::get_queue_metadata(self.store.as_ref(), &name).await
    }

    /// Publish a payload to an existing queue
    pub async fn publish_message(
        &self,
        name: &str,
        payload: Value,
        options: MessageOptions,
    ) -> Result<MessageId, QueueError> {
        self.ensure_open()?;
        let name = parse_name(name)?;
        producer::publish_message(self.store.as_ref(), &name, payload, options).await
    }

    /// Attach a handler to a queue using the configured consumer options
    pub async fn consume_messages(
        &self,
        name: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerHandle, QueueError> {
        self.ensure_open()?;
        let name = parse_name(name)?;
        consumer::consume(
            Arc::clone(&self.store),
            &name,
            handler,
            self.config.consumer_options(),
        )
        .await
    }

    /// Return entries stranded in a queue's pending list to the queue
    pub async fn recover_pending(&self, name: &str) -> Result<usize, QueueError> {
        self.ensure_open()?;
        let name = parse_name(name)?;
        consumer::recover_pending(self.store.as_ref(), &name).await
    }

    /// Mark the client closed
    ///
    /// Running consumers are not affected; they stop through their own handles.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(store = %self.store.store_type(), "Client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::InvalidState {
                message: "client is closed".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for BizzMq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BizzMq")
            .field("store", &self.store.store_type())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn parse_name(name: &str) -> Result<QueueName, QueueError> {
    Ok(QueueName::new(name.to_string())?)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
