//! In-memory backing store implementation for testing and development.
//!
//! This module provides a fully functional in-memory store that:
//! - Implements hashes, lists and publish/subscribe with the same atomicity
//!   per operation as Redis
//! - Provides thread-safe concurrent access
//! - Can simulate dropped notifications and store outages
//!
//! This store is intended for:
//! - Unit and integration testing of the engine
//! - Development without a running Redis
//! - Reference behavior for networked stores

use crate::error::QueueError;
use crate::provider::{BackingStore, StoreType, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all keys
#[derive(Default)]
struct StoreState {
    hashes: HashMap<String, HashMap<String, String>>,
    /// Front is the head, back is the tail
    lists: HashMap<String, VecDeque<String>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

// ============================================================================
// InMemoryStore
// ============================================================================

/// In-memory backing store implementation
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    notifications_enabled: Arc<AtomicBool>,
    fail_operations: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            notifications_enabled: Arc::new(AtomicBool::new(true)),
            fail_operations: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enable or disable delivery of published notifications
    ///
    /// When disabled, `publish` succeeds but reaches nobody, which is how a
    /// dropped notification looks to a consumer.
    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.notifications_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make every subsequent operation fail with a backing store error
    pub fn set_fail_operations(&self, fail: bool) {
        self.fail_operations.store(fail, Ordering::SeqCst);
    }

    /// Close every subscription on a channel, as a dropped pub/sub connection would
    pub fn disconnect_subscribers(&self, channel: &str) {
        if let Ok(mut state) = self.state.write() {
            state.subscribers.remove(channel);
        }
    }

    /// Copy of a list, head first
    pub fn list_snapshot(&self, key: &str) -> Vec<String> {
        self.state
            .read()
            .map(|state| {
                state
                    .lists
                    .get(key)
                    .map(|list| list.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Number of live subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .read()
            .map(|state| {
                state
                    .subscribers
                    .get(channel)
                    .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn check_available(&self, operation: &str) -> Result<(), QueueError> {
        if self.fail_operations.load(Ordering::SeqCst) {
            return Err(QueueError::backing_store(operation, "store unavailable"));
        }
        Ok(())
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, StoreState>, QueueError> {
        self.check_available(operation)?;
        self.state
            .read()
            .map_err(|_| QueueError::backing_store(operation, "store lock poisoned"))
    }

    fn write(&self, operation: &str) -> Result<RwLockWriteGuard<'_, StoreState>, QueueError> {
        self.check_available(operation)?;
        self.state
            .write()
            .map_err(|_| QueueError::backing_store(operation, "store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreState {
    fn pop_back(&mut self, key: &str) -> Option<String> {
        let list = self.lists.get_mut(key)?;
        let value = list.pop_back();
        // Redis deletes a list once it is empty
        if list.is_empty() {
            self.lists.remove(key);
        }
        value
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, QueueError> {
        let state = self.read("exists")?;
        Ok(state.hashes.contains_key(key) || state.lists.contains_key(key))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), QueueError> {
        let mut state = self.write("hset")?;
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, QueueError> {
        let state = self.read("hgetall")?;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn push_head(&self, key: &str, value: &str) -> Result<usize, QueueError> {
        let mut state = self.write("lpush")?;
        let list = state.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn pop_tail(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut state = self.write("rpop")?;
        Ok(state.pop_back(key))
    }

    async fn move_tail_to_head(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<String>, QueueError> {
        let mut state = self.write("rpoplpush")?;
        let Some(value) = state.pop_back(source) else {
            return Ok(None);
        };
        state
            .lists
            .entry(destination.to_string())
            .or_default()
            .push_front(value.clone());
        Ok(Some(value))
    }

    async fn remove(&self, key: &str, value: &str) -> Result<usize, QueueError> {
        let mut state = self.write("lrem")?;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|entry| entry != value);
        let removed = before - list.len();
        if list.is_empty() {
            state.lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_len(&self, key: &str) -> Result<usize, QueueError> {
        let state = self.read("llen")?;
        Ok(state.lists.get(key).map(VecDeque::len).unwrap_or(0))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, QueueError> {
        let mut state = self.write("publish")?;
        let Some(senders) = state.subscribers.get_mut(channel) else {
            return Ok(0);
        };

        senders.retain(|sender| !sender.is_closed());
        if !self.notifications_enabled.load(Ordering::SeqCst) {
            return Ok(0);
        }

        let delivered = senders
            .iter()
            .filter(|sender| sender.send(message.to_string()).is_ok())
            .count();
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, QueueError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut state = self.write("subscribe")?;
            state
                .subscribers
                .entry(channel.to_string())
                .or_default()
                .push(sender);
        }

        let messages = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        })
        .boxed();

        Ok(Subscription::new(channel.to_string(), messages))
    }

    fn store_type(&self) -> StoreType {
        StoreType::InMemory
    }
}
