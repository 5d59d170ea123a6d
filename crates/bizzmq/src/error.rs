//! Error types for queue operations.

use thiserror::Error;

/// Error returned by a user message handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid argument {field}: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Queue \"{queue_name}\" does not exist, create it first")]
    QueueNotFound { queue_name: String },

    #[error("Backing store operation '{operation}' failed: {message}")]
    BackingStore { operation: String, message: String },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[from] SerializationError),

    #[error("Processing of message {message_id} failed: {message}")]
    ProcessingFailure { message_id: String, message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),
}

impl QueueError {
    /// Build a backing store error for the named operation.
    pub fn backing_store(operation: &str, message: impl std::fmt::Display) -> Self {
        Self::BackingStore {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidArgument { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::BackingStore { .. } => true,
            Self::MalformedEnvelope(_) => false,
            Self::ProcessingFailure { .. } => false,
            Self::InvalidState { .. } => false,
            Self::ConfigurationError(_) => false,
        }
    }
}

impl From<ValidationError> for QueueError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Required { field } => Self::InvalidArgument {
                field,
                message: "value is required".to_string(),
            },
        }
    }
}

/// Errors during envelope serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown message status '{status}'")]
    UnknownStatus { status: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
