//! Redis backing store.
//!
//! Commands go through one multiplexed connection shared by every clone of the
//! store. Each subscription opens its own pub/sub connection, which is closed
//! when the subscription is dropped.

use crate::error::QueueError;
use crate::provider::{BackingStore, StoreType, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info};

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Open a connection to the Redis server at `url`
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        if url.is_empty() {
            return Err(QueueError::InvalidArgument {
                field: "redis_url".to_string(),
                message: "Redis URL is required".to_string(),
            });
        }

        let client = redis::Client::open(url).map_err(|e| QueueError::InvalidArgument {
            field: "redis_url".to_string(),
            message: e.to_string(),
        })?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_error("connect", e))?;

        info!(url = %redact(url), "Connected to Redis");
        Ok(Self { client, connection })
    }
}

fn store_error(operation: &str, err: redis::RedisError) -> QueueError {
    QueueError::backing_store(operation, err)
}

/// Strip credentials from a connection URL before logging it
fn redact(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((scheme_and_auth, host)) => {
            let scheme = scheme_and_auth.split("://").next().unwrap_or("redis");
            format!("{}://***@{}", scheme, host)
        }
        None => url.to_string(),
    }
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool, QueueError> {
        let mut conn = self.connection.clone();
        conn.exists(key).await.map_err(|e| store_error("exists", e))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn.hset_multiple(key, fields).await;
        result.map_err(|e| store_error("hset", e))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, QueueError> {
        let mut conn = self.connection.clone();
        conn.hgetall(key).await.map_err(|e| store_error("hgetall", e))
    }

    async fn push_head(&self, key: &str, value: &str) -> Result<usize, QueueError> {
        let mut conn = self.connection.clone();
        conn.lpush(key, value)
            .await
            .map_err(|e| store_error("lpush", e))
    }

    async fn pop_tail(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection.clone();
        conn.rpop(key, None).await.map_err(|e| store_error("rpop", e))
    }

    async fn move_tail_to_head(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection.clone();
        conn.rpoplpush(source, destination)
            .await
            .map_err(|e| store_error("rpoplpush", e))
    }

    async fn remove(&self, key: &str, value: &str) -> Result<usize, QueueError> {
        let mut conn = self.connection.clone();
        conn.lrem(key, 0, value)
            .await
            .map_err(|e| store_error("lrem", e))
    }

    async fn list_len(&self, key: &str) -> Result<usize, QueueError> {
        let mut conn = self.connection.clone();
        conn.llen(key).await.map_err(|e| store_error("llen", e))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, QueueError> {
        let mut conn = self.connection.clone();
        conn.publish(channel, message)
            .await
            .map_err(|e| store_error("publish", e))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, QueueError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| store_error("subscribe", e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| store_error("subscribe", e))?;
        debug!(channel = %channel, "Subscribed to Redis channel");

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() })
            .boxed();

        Ok(Subscription::new(channel.to_string(), messages))
    }

    fn store_type(&self) -> StoreType {
        StoreType::Redis
    }
}
