//! # BizzMQ
//!
//! Lightweight message queue engine on top of a key-value store with lists,
//! hashes and publish/subscribe (Redis, or an in-memory store for tests).
//!
//! This library provides:
//! - Queue creation with per-queue retry budget and optional dead-letter queue
//! - Publishing of JSON payloads wrapped in a lifecycle-tracked envelope
//! - Consumers that combine wake-up notifications with a periodic fallback scan
//! - Retry with configurable backoff, then hand-off to the dead-letter queue
//! - Opt-in pending-list acknowledgment with explicit crash recovery
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, message ids and the envelope
//! - [`provider`] - The backing store abstraction
//! - [`providers`] - In-memory and Redis backing stores
//! - [`queue`] - Queue registry
//! - [`producer`] - Publishing
//! - [`consumer`] - Consumer engine
//! - [`retry`] - Retry policy and dead-letter resolution
//! - [`config`] - Configuration loading
//! - [`client`] - The [`BizzMq`] client facade

pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod producer;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod retry;

// Re-export commonly used types at crate root for convenience
pub use client::BizzMq;
pub use config::{BizzMqConfig, ConsumerConfig};
pub use consumer::{
    consume, handler_fn, recover_pending, AckMode, ConsumerHandle, ConsumerOptions,
    DeliveryOutcome, MessageHandler,
};
pub use error::{
    ConfigurationError, HandlerError, QueueError, SerializationError, ValidationError,
};
pub use message::{Envelope, MessageId, MessageOptions, MessageStatus, QueueName, Timestamp};
pub use producer::publish_message;
pub use provider::{BackingStore, StoreType, Subscription};
pub use providers::InMemoryStore;
#[cfg(feature = "redis")]
pub use providers::RedisStore;
pub use queue::{create_queue, get_queue_config, QueueMetadata, QueueOptions};
pub use retry::{BackoffStrategy, RetryOutcome, RetryPolicy};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
