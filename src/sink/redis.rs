//! Redis Streams sink.
//!
//! Appends each message to the stream named after the topic with `XADD`,
//! carrying the partition key and JSON payload as fields. Suitable for
//! multi-process deployments where consumers read the stream with consumer
//! groups.

use super::{DlqSink, EventSink};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

/// Sink backed by Redis Streams. Implements both [`EventSink`] and
/// [`DlqSink`].
pub struct RedisStreamSink {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamSink").finish_non_exhaustive()
    }
}

impl RedisStreamSink {
    /// Connects to Redis with the given connection string.
    pub async fn new(connection_string: &str) -> EngineResult<Self> {
        let client = Client::open(connection_string)
            .map_err(|e| EngineError::sink_with("failed to create Redis client", e))?;

        let conn = timeout(Duration::from_secs(10), client.get_connection_manager())
            .await
            .map_err(|e| EngineError::sink_with("timed out connecting to Redis", e))?
            .map_err(|e| EngineError::sink_with("failed to create Redis connection manager", e))?;

        tracing::info!("connected Redis stream sink");
        Ok(Self { conn })
    }

    async fn append(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        let body = serde_json::to_string(&payload)?;
        let mut conn = self.conn.clone();
        conn.xadd::<_, _, _, _, ()>(topic, "*", &[("key", key), ("payload", body.as_str())])
            .await
            .map_err(|e| EngineError::sink_with(format!("XADD to '{topic}' failed"), e))?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for RedisStreamSink {
    async fn send(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        self.append(topic, key, payload).await
    }
}

#[async_trait]
impl DlqSink for RedisStreamSink {
    async fn send(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        self.append(topic, key, payload).await
    }
}
