//! Event publisher: fans lifecycle events to the event sink.

use crate::event::TaskEvent;
use crate::sink::EventSink;
use std::sync::Arc;

/// Publishes task lifecycle events, keyed by task id.
///
/// The call is fire-and-forget from the engine's perspective: delivery
/// problems are logged and never surfaced to the caller, so a flaky event
/// bus cannot change an execution outcome.
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
    topic: String,
}

impl EventPublisher {
    /// Creates a publisher writing to the given topic.
    pub fn new(sink: Arc<dyn EventSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
        }
    }

    /// Topic this publisher writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes one event. Never fails.
    pub async fn publish(&self, event: TaskEvent) {
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    task_id = %event.task_id,
                    event_type = %event.event_type,
                    error = %e,
                    "failed to encode task event"
                );
                return;
            }
        };

        match self.sink.send(&self.topic, &event.task_id, payload).await {
            Ok(()) => {
                tracing::debug!(
                    task_id = %event.task_id,
                    event_type = %event.event_type,
                    "published task event"
                );
            }
            Err(e) => {
                tracing::error!(
                    task_id = %event.task_id,
                    event_type = %event.event_type,
                    error = %e,
                    "failed to publish task event"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, EngineResult};
    use crate::sink::MemorySink;
    use crate::task::TaskBuilder;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};

    struct RejectingSink;

    #[async_trait]
    impl EventSink for RejectingSink {
        async fn send(&self, _topic: &str, _key: &str, _payload: Value) -> EngineResult<()> {
            Err(EngineError::sink("broker unavailable"))
        }
    }

    #[tokio::test]
    async fn publishes_wire_payload_keyed_by_task_id() {
        let sink = MemorySink::shared();
        let publisher = EventPublisher::new(sink.clone(), "task-events");

        let task = TaskBuilder::for_type("EMAIL")
            .unwrap()
            .with_task_id("t-1")
            .unwrap()
            .build();
        publisher
            .publish(TaskEvent::task_started(&task, Utc::now()))
            .await;

        let messages = sink.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "task-events");
        assert_eq!(messages[0].key, "t-1");
        assert_eq!(messages[0].payload["eventType"], json!("TASK_STARTED"));
        assert_eq!(messages[0].payload["taskId"], json!("t-1"));
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let publisher = EventPublisher::new(Arc::new(RejectingSink), "task-events");
        let task = TaskBuilder::for_type("EMAIL").unwrap().build();

        // Must not panic or propagate.
        publisher
            .publish(TaskEvent::task_started(&task, Utc::now()))
            .await;
    }
}
