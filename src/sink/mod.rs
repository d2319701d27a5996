//! Messaging ports for lifecycle events and dead-lettered tasks.
//!
//! Both sinks share the `send(topic, key, payload)` shape; the key is always
//! the task id, so backends that partition by key give subscribers per-task
//! ordering. Batching and delivery guarantees beyond that are the backend's
//! business.

use crate::error::EngineResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(feature = "redis-sink")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-sink")))]
pub mod redis;

#[cfg(feature = "redis-sink")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-sink")))]
pub use redis::RedisStreamSink;

/// Destination for lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sends one JSON payload keyed by task id.
    async fn send(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()>;
}

/// Destination for dead-lettered task payloads. Same shape as
/// [`EventSink`], separate topic.
#[async_trait]
pub trait DlqSink: Send + Sync {
    /// Sends one JSON payload keyed by task id.
    async fn send(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()>;
}

/// One message accepted by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SinkMessage {
    /// Topic the message was sent to
    pub topic: String,
    /// Partition key (the task id)
    pub key: String,
    /// JSON payload
    pub payload: Value,
}

/// In-memory sink that records every message, in order.
///
/// Implements both sink traits, doubling as the development backend and the
/// observable test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<SinkMessage>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty sink behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every accepted message, oldest first.
    pub async fn messages(&self) -> Vec<SinkMessage> {
        self.messages.lock().await.clone()
    }

    /// Snapshot of messages sent to one topic.
    pub async fn messages_for(&self, topic: &str) -> Vec<SinkMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Drops every recorded message.
    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }

    async fn record(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        self.messages.lock().await.push(SinkMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        self.record(topic, key, payload).await
    }
}

#[async_trait]
impl DlqSink for MemorySink {
    async fn send(&self, topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        self.record(topic, key, payload).await
    }
}
