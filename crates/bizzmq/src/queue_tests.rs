//! Tests for the queue registry.

use super::*;
use crate::providers::InMemoryStore;

fn name(value: &str) -> QueueName {
    QueueName::new(value.to_string()).unwrap()
}

#[tokio::test]
async fn test_create_queue_writes_metadata() {
    let store = InMemoryStore::new();
    let queue = name("orders");

    let created = create_queue(&store, &queue, QueueOptions::new().with_max_retries(5))
        .await
        .unwrap();

    assert!(created);
    let fields = store.hash_get_all("queue_meta:orders").await.unwrap();
    assert_eq!(fields.get("max_retries").map(String::as_str), Some("5"));
    assert_eq!(
        fields.get("config_dead_letter_queue").map(String::as_str),
        Some("0")
    );
    assert!(fields.contains_key("createdAt"));
}

#[tokio::test]
async fn test_create_queue_is_idempotent() {
    let store = InMemoryStore::new();
    let queue = name("orders");

    let first = QueueOptions::new().with_dead_letter(true).with_max_retries(1);
    let second = QueueOptions::new().with_dead_letter(false).with_max_retries(9);

    assert!(create_queue(&store, &queue, first).await.unwrap());
    assert!(!create_queue(&store, &queue, second).await.unwrap());

    assert_eq!(get_queue_config(&store, &queue).await.unwrap(), first);
}

#[tokio::test]
async fn test_dead_letter_queue_keeps_caller_configuration() {
    let store = InMemoryStore::new();
    let dlq_options = QueueOptions::new().with_dead_letter(true).with_max_retries(7);

    create_queue(&store, &name("orders"), QueueOptions::new().with_dead_letter(true))
        .await
        .unwrap();
    assert!(!queue_exists(&store, &name("orders_dlq")).await.unwrap());

    assert!(create_queue(&store, &name("orders_dlq"), dlq_options).await.unwrap());
    assert_eq!(
        get_queue_config(&store, &name("orders_dlq")).await.unwrap(),
        dlq_options
    );
}

#[tokio::test]
async fn test_no_dead_letter_queue_without_dead_letter_option() {
    let store = InMemoryStore::new();
    create_queue(&store, &name("orders"), QueueOptions::new())
        .await
        .unwrap();

    assert!(!queue_exists(&store, &name("orders_dlq")).await.unwrap());
}

#[tokio::test]
async fn test_missing_queue_reads_defaults() {
    let store = InMemoryStore::new();

    let options = get_queue_config(&store, &name("ghost")).await.unwrap();

    assert_eq!(options, QueueOptions::default());
    assert!(get_queue_metadata(&store, &name("ghost")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_partial_and_legacy_records() {
    let store = InMemoryStore::new();
    store
        .hash_set(
            "queue_meta:legacy",
            &[
                ("config_dead_letter_queue".to_string(), "true".to_string()),
                ("maxRetries".to_string(), "7".to_string()),
            ],
        )
        .await
        .unwrap();
    store
        .hash_set(
            "queue_meta:broken",
            &[("max_retries".to_string(), "many".to_string())],
        )
        .await
        .unwrap();

    let legacy = get_queue_config(&store, &name("legacy")).await.unwrap();
    assert!(legacy.dead_letter_enabled);
    assert_eq!(legacy.max_retries, 7);

    let broken = get_queue_config(&store, &name("broken")).await.unwrap();
    assert!(!broken.dead_letter_enabled);
    assert_eq!(broken.max_retries, DEFAULT_MAX_RETRIES);
}

#[tokio::test]
async fn test_metadata_includes_creation_time() {
    let store = InMemoryStore::new();
    let before = Timestamp::now();
    create_queue(&store, &name("orders"), QueueOptions::new())
        .await
        .unwrap();

    let metadata = get_queue_metadata(&store, &name("orders"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(metadata.name.as_str(), "orders");
    assert!(metadata.created_at.unwrap() >= before);
}

#[tokio::test]
async fn test_store_failure_surfaces() {
    let store = InMemoryStore::new();
    store.set_fail_operations(true);

    let result = create_queue(&store, &name("orders"), QueueOptions::new()).await;
    assert!(matches!(result, Err(QueueError::BackingStore { .. })));

    let result = get_queue_config(&store, &name("orders")).await;
    assert!(matches!(result, Err(QueueError::BackingStore { .. })));
}
