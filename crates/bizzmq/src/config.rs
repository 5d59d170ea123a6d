//! Client configuration.
//!
//! Sources, applied in order (later sources override earlier ones):
//!  1. `bizzmq.{toml,yaml,json}` in the working directory, if present
//!  2. an explicit file path, if given (must exist)
//!  3. environment variables prefixed `BIZZMQ__` with a double-underscore
//!     separator, e.g. `BIZZMQ__CONSUMER__FALLBACK_INTERVAL_MS=500`
//!
//! Every field carries a serde default, so an unconfigured environment yields
//! a valid configuration. A malformed file or a value that cannot be coerced
//! to its field's type is an error.

use crate::consumer::{AckMode, ConsumerOptions};
use crate::error::ConfigurationError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Base name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "bizzmq";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "BIZZMQ";

/// Redis server used when no URL is configured
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BizzMqConfig {
    /// Connection URL of the Redis backing store
    pub redis_url: String,

    pub consumer: ConsumerConfig,

    /// Redelivery timing for failed messages
    pub retry: RetryPolicy,
}

impl Default for BizzMqConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            consumer: ConsumerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Consumer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Interval between fallback scans
    pub fallback_interval_ms: u64,

    pub ack_mode: AckMode,

    /// How long a consumer shutdown waits for each loop
    pub shutdown_timeout_ms: u64,

    /// Pause between attempts to restore a lost notification subscription
    pub resubscribe_delay_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            fallback_interval_ms: 5_000,
            ack_mode: AckMode::Destructive,
            shutdown_timeout_ms: 5_000,
            resubscribe_delay_ms: 1_000,
        }
    }
}

impl BizzMqConfig {
    /// Load configuration from the default file, `path` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_from(Some(DEFAULT_CONFIG_FILE), path)
    }

    /// Load configuration, looking for `default_file` (a base name without
    /// extension) instead of the standard one
    pub fn load_from(
        default_file: Option<&str>,
        path: Option<&Path>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(name) = default_file {
            builder = builder.add_source(config::File::with_name(name).required(false));
        }

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::Missing {
                    key: path.display().to_string(),
                });
            }
            debug!(path = %path.display(), "Loading configuration from explicit path");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let loaded: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.redis_url.trim().is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "redis_url must not be empty".to_string(),
            });
        }
        if self.consumer.fallback_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "consumer.fallback_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.consumer.resubscribe_delay_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "consumer.resubscribe_delay_ms must be greater than zero".to_string(),
            });
        }
        self.retry.validate()
    }

    /// Consumer options derived from this configuration
    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions::new()
            .with_fallback_interval(Duration::from_millis(self.consumer.fallback_interval_ms))
            .with_ack_mode(self.consumer.ack_mode)
            .with_retry_policy(self.retry.clone())
            .with_shutdown_timeout(Duration::from_millis(self.consumer.shutdown_timeout_ms))
            .with_resubscribe_delay(Duration::from_millis(self.consumer.resubscribe_delay_ms))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
