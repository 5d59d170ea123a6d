//! Tests for backing store types.

use super::*;
use futures::stream;

#[test]
fn test_store_type_display() {
    assert_eq!(StoreType::InMemory.to_string(), "in-memory");
    assert_eq!(StoreType::Redis.to_string(), "redis");
}

#[tokio::test]
async fn test_subscription_yields_stream_items_then_none() {
    let items = stream::iter(vec!["a".to_string(), "b".to_string()]).boxed();
    let mut subscription = Subscription::new("queue:orders".to_string(), items);

    assert_eq!(subscription.next_message().await.as_deref(), Some("a"));
    assert_eq!(subscription.next_message().await.as_deref(), Some("b"));
    assert_eq!(subscription.next_message().await, None);
}
