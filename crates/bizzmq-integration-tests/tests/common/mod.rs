//! Common test utilities for bizzmq integration tests
//!
//! This module provides:
//! - A recording message handler with scriptable outcomes
//! - Client construction over the in-memory store
//! - Polling helpers for asynchronous consumer effects

use async_trait::async_trait;
use bizzmq::{BizzMq, BizzMqConfig, Envelope, HandlerError, InMemoryStore, MessageHandler};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler that records every payload and fails its first `failures` calls
#[derive(Clone)]
#[allow(dead_code)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<Value>>>,
    failures: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl RecordingHandler {
    /// Handler that always succeeds
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    /// Handler that never succeeds
    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Handler that fails `failures` times, then succeeds
    pub fn failing_first(failures: usize) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(AtomicUsize::new(failures)),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn as_handler(&self) -> Arc<dyn MessageHandler> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn process(&self, payload: Value) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(payload);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != usize::MAX {
            self.failures.fetch_sub(1, Ordering::SeqCst);
        }
        Err("simulated handler failure".into())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Client over a fresh in-memory store with a short fallback interval
#[allow(dead_code)]
pub fn test_client(fallback_interval_ms: u64) -> (InMemoryStore, BizzMq) {
    let store = InMemoryStore::new();
    let mut config = BizzMqConfig::default();
    config.consumer.fallback_interval_ms = fallback_interval_ms;
    let client = BizzMq::new(Arc::new(store.clone()), config);
    (store, client)
}

/// Decode every entry of a list, oldest (tail) first
#[allow(dead_code)]
pub fn envelopes_oldest_first(store: &InMemoryStore, key: &str) -> Vec<Envelope> {
    store
        .list_snapshot(key)
        .iter()
        .rev()
        .map(|raw| Envelope::deserialize(raw.as_bytes()).unwrap())
        .collect()
}

/// Poll `condition` until it holds or five seconds pass
#[allow(dead_code)]
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
