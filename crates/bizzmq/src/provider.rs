//! Backing store abstraction.
//!
//! The engine never talks to a concrete key-value store directly. Everything
//! it needs (hashes for queue metadata, lists for backlogs, publish/subscribe
//! for wake-ups) goes through [`BackingStore`], whose operations are each
//! atomic in the underlying store. There is no cross-operation transaction.

use crate::error::QueueError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Enumeration of supported backing stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreType {
    InMemory,
    Redis,
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => f.write_str("in-memory"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// Live subscription to a notification channel
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    channel: String,
    messages: BoxStream<'static, String>,
}

impl Subscription {
    /// Wrap a stream of notification payloads
    pub fn new(channel: String, messages: BoxStream<'static, String>) -> Self {
        Self { channel, messages }
    }

    /// Wait for the next notification; `None` once the channel is closed
    pub async fn next_message(&mut self) -> Option<String> {
        self.messages.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Interface implemented by backing stores (Redis, in-memory)
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Check whether a key exists
    async fn exists(&self, key: &str) -> Result<bool, QueueError>;

    /// Write several hash fields in one atomic operation
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), QueueError>;

    /// Read all fields of a hash; empty when the key is absent
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, QueueError>;

    /// Push a value at the head of a list, returning the new length
    async fn push_head(&self, key: &str, value: &str) -> Result<usize, QueueError>;

    /// Pop a value from the tail of a list without blocking
    async fn pop_tail(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Atomically pop the tail of `source` and push it at the head of `destination`
    async fn move_tail_to_head(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<String>, QueueError>;

    /// Remove every occurrence of `value` from a list, returning the count removed
    async fn remove(&self, key: &str, value: &str) -> Result<usize, QueueError>;

    /// Length of a list; zero when the key is absent
    async fn list_len(&self, key: &str) -> Result<usize, QueueError>;

    /// Publish a notification, returning the number of receivers
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, QueueError>;

    /// Subscribe to a notification channel
    async fn subscribe(&self, channel: &str) -> Result<Subscription, QueueError>;

    /// Get store type
    fn store_type(&self) -> StoreType;
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
