//! Integration tests for pending-list acknowledgement and recovery
//!
//! These tests verify:
//! - Pending-list consumers leave nothing behind once entries are handled
//! - Entries stranded in the pending list by a crashed consumer are recovered
//! - Recovered entries are delivered again, oldest first

mod common;

use bizzmq::{AckMode, BackingStore, BizzMq, BizzMqConfig, InMemoryStore, MessageOptions, QueueOptions};
use common::{test_client, wait_until, RecordingHandler};
use serde_json::json;
use std::sync::Arc;

fn pending_list_client() -> (InMemoryStore, BizzMq) {
    let store = InMemoryStore::new();
    let mut config = BizzMqConfig::default();
    config.consumer.fallback_interval_ms = 50;
    config.consumer.ack_mode = AckMode::PendingList;
    let client = BizzMq::new(Arc::new(store.clone()), config);
    (store, client)
}

#[tokio::test]
async fn test_pending_list_is_empty_after_successful_deliveries() {
    let (store, client) = pending_list_client();
    client
        .create_queue("reports", QueueOptions::new())
        .await
        .unwrap();
    for n in 0..5 {
        client
            .publish_message("reports", json!({"n": n}), MessageOptions::new())
            .await
            .unwrap();
    }
    let handler = RecordingHandler::succeeding();

    let consumer = client
        .consume_messages("reports", handler.as_handler())
        .await
        .unwrap();
    assert!(wait_until(|| handler.call_count() == 5).await);
    consumer.shutdown().await.unwrap();

    assert_eq!(store.list_len("queue:reports").await.unwrap(), 0);
    assert_eq!(store.list_len("queue:reports:processing").await.unwrap(), 0);
}

#[tokio::test]
async fn test_stranded_entries_are_recovered_and_redelivered() {
    let (store, client) = test_client(50);
    client
        .create_queue("reports", QueueOptions::new())
        .await
        .unwrap();
    client
        .publish_message("reports", json!({"n": 1}), MessageOptions::new())
        .await
        .unwrap();
    client
        .publish_message("reports", json!({"n": 2}), MessageOptions::new())
        .await
        .unwrap();

    // A consumer took both entries into its pending list, then died
    for _ in 0..2 {
        store
            .move_tail_to_head("queue:reports", "queue:reports:processing")
            .await
            .unwrap();
    }
    assert_eq!(store.list_len("queue:reports").await.unwrap(), 0);

    let recovered = client.recover_pending("reports").await.unwrap();
    assert_eq!(recovered, 2);
    assert_eq!(store.list_len("queue:reports:processing").await.unwrap(), 0);

    let handler = RecordingHandler::succeeding();
    let consumer = client
        .consume_messages("reports", handler.as_handler())
        .await
        .unwrap();
    assert!(wait_until(|| handler.call_count() == 2).await);
    consumer.shutdown().await.unwrap();

    assert_eq!(handler.calls(), vec![json!({"n": 1}), json!({"n": 2})]);
}

#[tokio::test]
async fn test_recover_pending_on_unknown_queue() {
    let (_store, client) = test_client(50);

    let recovered = client.recover_pending("nothing-here").await.unwrap();

    assert_eq!(recovered, 0);
}
