//! Message types for queue operations including core domain identifiers.
//!
//! The [`Envelope`] is the only persisted form of a unit of work: it is
//! serialized as JSON into the queue list and carries the lifecycle status
//! together with the retry bookkeeping used by the resolver.

use crate::error::{SerializationError, ValidationError};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key prefix of the per-queue metadata hash.
pub const QUEUE_META_PREFIX: &str = "queue_meta:";

/// Key prefix of the per-queue message list and notification channel.
pub const QUEUE_KEY_PREFIX: &str = "queue:";

/// Suffix appended to a queue name to form its dead-letter queue.
pub const DEAD_LETTER_SUFFIX: &str = "_dlq";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Queue name; every storage key is derived from it
///
/// Any non-empty string is accepted so that queues created by other clients
/// stay reachable, including names containing `:` or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create a queue name, rejecting only the empty string
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "queue_name".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the metadata hash: `queue_meta:<name>`
    pub fn meta_key(&self) -> String {
        format!("{}{}", QUEUE_META_PREFIX, self.0)
    }

    /// Key of the message list, also the notification channel: `queue:<name>`
    pub fn list_key(&self) -> String {
        format!("{}{}", QUEUE_KEY_PREFIX, self.0)
    }

    /// Key of the in-flight list used by pending-list acknowledgment
    pub fn pending_key(&self) -> String {
        format!("{}{}:processing", QUEUE_KEY_PREFIX, self.0)
    }

    /// Name of the dead-letter queue paired with this queue: `<name>_dlq`
    pub fn dead_letter(&self) -> QueueName {
        Self(format!("{}{}", self.0, DEAD_LETTER_SUFFIX))
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifier assigned to a message at publish time.
///
/// Format is `message:<millis>-<seq>-<rand>`. The millisecond prefix keeps ids
/// ordered by publish time; the process-wide sequence and the random suffix
/// keep ids distinct when several messages are published within the same
/// millisecond, in this process or in another one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new message id stamped with the given time
    pub fn generate(at: &Timestamp) -> Self {
        let sequence = MESSAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "message:{}-{}-{}",
            at.as_millis(),
            sequence,
            &random[..8]
        ))
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Millisecond-precision timestamp, serialized as epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(#[serde(with = "chrono::serde::ts_milliseconds")] DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time, truncated to milliseconds
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }

    /// Create timestamp from epoch milliseconds
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(Self)
    }

    /// Milliseconds since the Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle status of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Waiting,
    Processing,
    Processed,
    Failed,
    Requeued,
}

impl MessageStatus {
    /// Get the wire spelling of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Requeued => "requeued",
        }
    }

    /// Check whether the lifecycle allows moving from `self` to `next`
    ///
    /// `waiting -> processing -> {processed | failed}`, `failed -> requeued`,
    /// `requeued -> processing`.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Processing)
                | (Self::Requeued, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Requeued)
        )
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "requeued" => Ok(Self::Requeued),
            other => Err(SerializationError::UnknownStatus {
                status: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Message Options
// ============================================================================

/// Per-message options carried inside the envelope
///
/// Failure fields are only populated on dead-letter copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageOptions {
    /// Informational only; delivery order ignores it
    pub priority: i64,

    #[serde(rename = "retryCount")]
    pub retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_updated: Option<Timestamp>,

    /// Error text of the failure that dead-lettered the message
    #[serde(rename = "message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub error_timestamp: Option<Timestamp>,

    #[serde(rename = "originalQueue", skip_serializing_if = "Option::is_none")]
    pub original_queue: Option<String>,

    #[serde(rename = "failedAt", skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
}

impl MessageOptions {
    /// Create new message options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the informational priority
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Attach failure metadata describing why a message was dead-lettered
    pub fn with_failure(mut self, original_queue: &QueueName, error_message: String) -> Self {
        let now = Timestamp::now();
        self.error_message = Some(error_message);
        self.error_timestamp = Some(now);
        self.original_queue = Some(original_queue.as_str().to_string());
        self.failed_at = Some(now);
        self
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// The persisted record of one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub queue_name: String,
    pub message_id: MessageId,
    #[serde(rename = "message")]
    pub payload: Value,
    #[serde(default)]
    pub options: MessageOptions,
    pub timestamp_created: Timestamp,
    pub timestamp_updated: Timestamp,
    pub status: MessageStatus,
}

impl Envelope {
    /// Create a fresh envelope in the `waiting` state
    pub fn new(queue_name: &QueueName, payload: Value, options: MessageOptions) -> Self {
        let now = Timestamp::now();
        Self {
            queue_name: queue_name.as_str().to_string(),
            message_id: MessageId::generate(&now),
            payload,
            options,
            timestamp_created: now,
            timestamp_updated: now,
            status: MessageStatus::Waiting,
        }
    }

    /// Encode the envelope for storage
    pub fn serialize(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an envelope read from storage
    pub fn deserialize(raw: &[u8]) -> Result<Self, SerializationError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Move the envelope to `next`, refreshing `timestamp_updated`
    ///
    /// The envelope is left unchanged when the lifecycle forbids the move.
    pub fn transition(&mut self, next: MessageStatus) -> Result<(), crate::error::QueueError> {
        if !self.status.can_transition_to(next) {
            return Err(crate::error::QueueError::InvalidState {
                message: format!(
                    "message {} cannot move from {} to {}",
                    self.message_id, self.status, next
                ),
            });
        }

        self.status = next;
        self.timestamp_updated = Timestamp::now();
        Ok(())
    }

    /// Payload as handed to a handler: objects as-is, anything else as `{"data": ..}`
    pub fn handler_payload(&self) -> Value {
        match &self.payload {
            Value::Object(_) => self.payload.clone(),
            other => serde_json::json!({ "data": other }),
        }
    }

    /// Number of redeliveries this envelope has been through
    pub fn retry_count(&self) -> u32 {
        self.options.retry_count
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
