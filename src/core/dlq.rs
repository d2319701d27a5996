//! Dead-letter processor: finalises tasks the pipeline gives up on.

use crate::clock::Clock;
use crate::core::publisher::EventPublisher;
use crate::error::{EngineError, EngineResult};
use crate::event::TaskEvent;
use crate::sink::DlqSink;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Consumes `(task, cause)` pairs whose execution produced a non-retryable
/// terminal failure.
///
/// Ordering is fixed: persist DEAD_LETTER, then emit `MOVED_TO_DLQ`, then
/// forward the task payload to the DLQ sink. Only the persistence step can
/// fail the caller; publish and send problems are logged and swallowed, so
/// the persisted status is never undone.
pub struct DeadLetterProcessor {
    store: Arc<dyn TaskStore>,
    publisher: Arc<EventPublisher>,
    dlq_sink: Arc<dyn DlqSink>,
    dlq_topic: String,
    clock: Arc<dyn Clock>,
}

impl DeadLetterProcessor {
    /// Creates a processor writing dead letters to the given topic.
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: Arc<EventPublisher>,
        dlq_sink: Arc<dyn DlqSink>,
        dlq_topic: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            dlq_sink,
            dlq_topic: dlq_topic.into(),
            clock,
        }
    }

    /// Moves a failed task to the dead-letter queue.
    ///
    /// Re-processing a task already in DEAD_LETTER is harmless; the save
    /// only refreshes `updated_at`.
    pub async fn process(&self, task: &Task, cause: &EngineError) -> EngineResult<Task> {
        if task.task_id.trim().is_empty() {
            return Err(EngineError::invalid("task id cannot be blank"));
        }

        tracing::error!(
            task_id = %task.task_id,
            error = %cause,
            "moving task to DLQ"
        );

        let dead = task.with_status(TaskStatus::DeadLetter, self.clock.now());
        let saved = self.store.save(&dead).await?;

        self.publisher
            .publish(TaskEvent::moved_to_dlq(
                &saved,
                self.error_metadata(&saved, cause),
                self.clock.now(),
            ))
            .await;

        self.send_to_dlq(&saved).await;

        Ok(saved)
    }

    async fn send_to_dlq(&self, task: &Task) {
        let payload = match serde_json::to_value(task) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(task_id = %task.task_id, error = %e, "failed to encode DLQ payload");
                return;
            }
        };

        match self
            .dlq_sink
            .send(&self.dlq_topic, &task.task_id, payload)
            .await
        {
            Ok(()) => {
                tracing::info!(task_id = %task.task_id, "task forwarded to DLQ");
            }
            Err(e) => {
                tracing::error!(task_id = %task.task_id, error = %e, "failed to forward task to DLQ");
            }
        }
    }

    /// `stackTrace` carries the rendered error chain, the structured
    /// substitute for a native stack trace.
    fn error_metadata(&self, task: &Task, cause: &EngineError) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("taskType".to_string(), json!(task.task_type));
        metadata.insert("retryCount".to_string(), json!(task.retry_count));
        metadata.insert("errorType".to_string(), json!(cause.kind()));
        metadata.insert("errorMessage".to_string(), json!(cause.to_string()));
        metadata.insert("stackTrace".to_string(), json!(cause.chain_description()));
        metadata.insert(
            "timestamp".to_string(),
            json!(self.clock.now().to_rfc3339()),
        );
        metadata
    }
}

impl std::fmt::Debug for DeadLetterProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterProcessor")
            .field("dlq_topic", &self.dlq_topic)
            .finish_non_exhaustive()
    }
}
