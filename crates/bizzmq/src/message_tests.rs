//! Tests for message types and the envelope lifecycle.

use super::*;
use serde_json::json;

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

// ============================================================================
// Identifier Tests
// ============================================================================

mod identifiers {
    use super::*;

    #[test]
    fn test_queue_name_validation() {
        assert!(QueueName::new("test-queue-000".to_string()).is_ok());
        assert!(QueueName::new("orders:eu".to_string()).is_ok());
        assert!(QueueName::new("email queue".to_string()).is_ok());
        assert!(QueueName::new("émails".to_string()).is_ok());
        assert!(QueueName::new("user@tasks".to_string()).is_ok());
        assert!(QueueName::new("a".repeat(1_000)).is_ok());

        match QueueName::new(String::new()) {
            Err(ValidationError::Required { field }) => assert_eq!(field, "queue_name"),
            other => panic!("Expected Required, got: {:?}", other),
        }
    }

    #[test]
    fn test_keys_keep_names_verbatim() {
        let name = queue("orders:eu west");

        assert_eq!(name.meta_key(), "queue_meta:orders:eu west");
        assert_eq!(name.list_key(), "queue:orders:eu west");
        assert_eq!(name.dead_letter().as_str(), "orders:eu west_dlq");
    }

    #[test]
    fn test_queue_keys() {
        let name = queue("orders");

        assert_eq!(name.meta_key(), "queue_meta:orders");
        assert_eq!(name.list_key(), "queue:orders");
        assert_eq!(name.pending_key(), "queue:orders:processing");
        assert_eq!(name.dead_letter().as_str(), "orders_dlq");
        assert_eq!(name.dead_letter().list_key(), "queue:orders_dlq");
    }

    #[test]
    fn test_message_ids_are_distinct_within_one_millisecond() {
        let at = Timestamp::now();
        let first = MessageId::generate(&at);
        let second = MessageId::generate(&at);

        assert_ne!(first, second);
        let prefix = format!("message:{}-", at.as_millis());
        assert!(first.as_str().starts_with(&prefix));
        assert!(second.as_str().starts_with(&prefix));
    }

    #[test]
    fn test_message_id_parse_rejects_empty() {
        assert!("".parse::<MessageId>().is_err());
        assert_eq!(
            "message:1".parse::<MessageId>().unwrap().as_str(),
            "message:1"
        );
    }

    #[test]
    fn test_timestamp_has_millisecond_precision() {
        let now = Timestamp::now();
        let restored = Timestamp::from_millis(now.as_millis()).unwrap();
        assert_eq!(now, restored);
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use MessageStatus::*;

        assert!(Waiting.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Requeued));
        assert!(Requeued.can_transition_to(Processing));

        assert!(!Waiting.can_transition_to(Processed));
        assert!(!Processed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Requeued.can_transition_to(Requeued));
    }

    #[test]
    fn test_transition_refreshes_timestamp() {
        let mut envelope = Envelope::new(&queue("orders"), json!({"id": 1}), MessageOptions::new());
        let before = envelope.timestamp_updated;

        envelope.transition(MessageStatus::Processing).unwrap();

        assert_eq!(envelope.status, MessageStatus::Processing);
        assert!(envelope.timestamp_updated >= before);
    }

    #[test]
    fn test_invalid_transition_leaves_envelope_unchanged() {
        let mut envelope = Envelope::new(&queue("orders"), json!({"id": 1}), MessageOptions::new());
        let snapshot = envelope.clone();

        let result = envelope.transition(MessageStatus::Processed);

        assert!(matches!(
            result,
            Err(crate::error::QueueError::InvalidState { .. })
        ));
        assert_eq!(envelope, snapshot);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "requeued".parse::<MessageStatus>().unwrap(),
            MessageStatus::Requeued
        );
        assert!("lost".parse::<MessageStatus>().is_err());
        assert_eq!(MessageStatus::Failed.to_string(), "failed");
    }
}

// ============================================================================
// Envelope Encoding Tests
// ============================================================================

mod encoding {
    use super::*;

    #[test]
    fn test_new_envelope_defaults() {
        let envelope = Envelope::new(&queue("orders"), json!({"id": 7}), MessageOptions::new());

        assert_eq!(envelope.queue_name, "orders");
        assert_eq!(envelope.status, MessageStatus::Waiting);
        assert_eq!(envelope.retry_count(), 0);
        assert_eq!(envelope.timestamp_created, envelope.timestamp_updated);
        assert!(envelope.message_id.as_str().starts_with("message:"));
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let options = MessageOptions::new()
            .with_priority(5)
            .with_failure(&queue("orders"), "handler exploded".to_string());
        let mut envelope = Envelope::new(&queue("orders_dlq"), json!({"nested": [1, 2, 3]}), options);
        envelope.options.retry_count = 2;

        let raw = envelope.serialize().unwrap();
        let decoded = Envelope::deserialize(raw.as_bytes()).unwrap();

        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_wire_field_names() {
        let mut envelope = Envelope::new(&queue("orders"), json!("plain"), MessageOptions::new());
        envelope.options.retry_count = 3;

        let value: Value = serde_json::from_str(&envelope.serialize().unwrap()).unwrap();

        assert_eq!(value["queue_name"], "orders");
        assert_eq!(value["message"], "plain");
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["options"]["retryCount"], 3);
        assert_eq!(value["options"]["priority"], 0);
        assert!(value["timestamp_created"].is_i64());
        assert!(value["options"].get("originalQueue").is_none());
    }

    #[test]
    fn test_deserialize_tolerates_missing_options() {
        let raw = r#"{
            "queue_name": "orders",
            "message_id": "message:1700000000000",
            "message": {"id": 1},
            "timestamp_created": 1700000000000,
            "timestamp_updated": 1700000000000,
            "status": "waiting"
        }"#;

        let envelope = Envelope::deserialize(raw.as_bytes()).unwrap();

        assert_eq!(envelope.options, MessageOptions::default());
        assert_eq!(envelope.message_id.as_str(), "message:1700000000000");
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(Envelope::deserialize(b"not json at all").is_err());
        assert!(Envelope::deserialize(b"{\"message\": 1}").is_err());
    }

    #[test]
    fn test_handler_payload_wraps_non_objects() {
        let object = Envelope::new(&queue("q"), json!({"a": 1}), MessageOptions::new());
        assert_eq!(object.handler_payload(), json!({"a": 1}));

        let scalar = Envelope::new(&queue("q"), json!(42), MessageOptions::new());
        assert_eq!(scalar.handler_payload(), json!({"data": 42}));
    }
}
