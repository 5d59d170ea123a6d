//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::backing_store("lpush", "connection reset").is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "orders".to_string(),
    }
    .is_transient());

    assert!(!QueueError::InvalidState {
        message: "processed -> processing".to_string(),
    }
    .is_transient());

    assert!(!QueueError::ProcessingFailure {
        message_id: "message:1".to_string(),
        message: "boom".to_string(),
    }
    .is_transient());
}

#[test]
fn test_validation_error_becomes_invalid_argument() {
    let err: QueueError = ValidationError::Required {
        field: "queue_name".to_string(),
    }
    .into();

    match err {
        QueueError::InvalidArgument { field, .. } => assert_eq!(field, "queue_name"),
        other => panic!("Expected InvalidArgument, got: {:?}", other),
    }
}

#[test]
fn test_malformed_envelope_from_json_error() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: QueueError = SerializationError::from(json_err).into();

    assert!(matches!(err, QueueError::MalformedEnvelope(_)));
    assert!(err.to_string().starts_with("Malformed envelope"));
}

#[test]
fn test_queue_not_found_message_names_queue() {
    let err = QueueError::QueueNotFound {
        queue_name: "payments".to_string(),
    };
    assert!(err.to_string().contains("\"payments\""));
}
