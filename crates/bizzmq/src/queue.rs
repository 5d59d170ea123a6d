//! Queue registry: creation and lookup of per-queue configuration.
//!
//! A queue exists once its metadata hash `queue_meta:<name>` exists. The hash
//! is written once, in a single operation, and never updated afterwards.

use crate::error::QueueError;
use crate::message::{QueueName, Timestamp};
use crate::provider::BackingStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_DEAD_LETTER: &str = "config_dead_letter_queue";
const FIELD_MAX_RETRIES: &str = "max_retries";
const FIELD_MAX_RETRIES_LEGACY: &str = "maxRetries";

/// Default retry budget when a queue does not specify one
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-queue configuration, immutable once the queue is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Route messages that exhaust their retries to `<name>_dlq`
    pub dead_letter_enabled: bool,

    /// Redeliveries allowed before a message is dead-lettered
    pub max_retries: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            dead_letter_enabled: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl QueueOptions {
    /// Create new queue options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the dead-letter queue
    pub fn with_dead_letter(mut self, enabled: bool) -> Self {
        self.dead_letter_enabled = enabled;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn to_fields(self, created_at: Timestamp) -> Vec<(String, String)> {
        vec![
            (FIELD_CREATED_AT.to_string(), created_at.as_millis().to_string()),
            (
                FIELD_DEAD_LETTER.to_string(),
                if self.dead_letter_enabled { "1" } else { "0" }.to_string(),
            ),
            (FIELD_MAX_RETRIES.to_string(), self.max_retries.to_string()),
        ]
    }

    /// Rebuild options from a metadata hash, defaulting field by field
    fn from_fields(fields: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let dead_letter_enabled = fields
            .get(FIELD_DEAD_LETTER)
            .map(|v| matches!(v.as_str(), "1" | "true" | "True"))
            .unwrap_or(defaults.dead_letter_enabled);

        let max_retries = fields
            .get(FIELD_MAX_RETRIES)
            .or_else(|| fields.get(FIELD_MAX_RETRIES_LEGACY))
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        Self {
            dead_letter_enabled,
            max_retries,
        }
    }
}

/// Stored queue record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMetadata {
    pub name: QueueName,
    pub created_at: Option<Timestamp>,
    pub options: QueueOptions,
}

/// Create a queue unless it already exists.
///
/// Returns `true` when the queue was created and `false` when it already
/// existed, in which case its stored configuration is left untouched. This is
/// one metadata write; `<name>_dlq` is created with default options on first
/// use unless the caller creates it beforehand.
pub async fn create_queue(
    store: &dyn BackingStore,
    name: &QueueName,
    options: QueueOptions,
) -> Result<bool, QueueError> {
    let meta_key = name.meta_key();

    if store.exists(&meta_key).await? {
        info!(queue = %name, "Queue already exists");
        return Ok(false);
    }

    store
        .hash_set(&meta_key, &options.to_fields(Timestamp::now()))
        .await?;

    info!(
        queue = %name,
        dead_letter_enabled = options.dead_letter_enabled,
        max_retries = options.max_retries,
        "Queue created"
    );

    Ok(true)
}

/// Make sure a queue exists, creating it with default options if needed
pub(crate) async fn ensure_queue(store: &dyn BackingStore, name: &QueueName) -> Result<(), QueueError> {
    let meta_key = name.meta_key();
    if !store.exists(&meta_key).await? {
        store
            .hash_set(&meta_key, &QueueOptions::default().to_fields(Timestamp::now()))
            .await?;
        debug!(queue = %name, "Queue created with default options");
    }
    Ok(())
}

/// Check whether a queue has been created
pub async fn queue_exists(store: &dyn BackingStore, name: &QueueName) -> Result<bool, QueueError> {
    store.exists(&name.meta_key()).await
}

/// Read a queue's configuration.
///
/// Absent or unparsable fields fall back to their defaults individually, so a
/// partially written or legacy record still yields a usable configuration.
pub async fn get_queue_config(
    store: &dyn BackingStore,
    name: &QueueName,
) -> Result<QueueOptions, QueueError> {
    let fields = store.hash_get_all(&name.meta_key()).await?;
    Ok(QueueOptions::from_fields(&fields))
}

/// Read the full stored record of a queue; `None` when it does not exist
pub async fn get_queue_metadata(
    store: &dyn BackingStore,
    name: &QueueName,
) -> Result<Option<QueueMetadata>, QueueError> {
    let fields = store.hash_get_all(&name.meta_key()).await?;
    if fields.is_empty() {
        return Ok(None);
    }

    let created_at = fields
        .get(FIELD_CREATED_AT)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(Timestamp::from_millis);

    Ok(Some(QueueMetadata {
        name: name.clone(),
        created_at,
        options: QueueOptions::from_fields(&fields),
    }))
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
