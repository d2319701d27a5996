//! Lifecycle events published for every observable task transition.
//!
//! Events are immutable audit records. The engine persists a status before
//! emitting the matching event, which gives subscribers at-least-once
//! semantics: duplicates are possible after a crash between persist and
//! publish, so consumers must be idempotent on
//! `(task_id, event_type, timestamp)`.

use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Types of task lifecycle events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A new task was accepted and persisted
    TaskCreated,
    /// Execution of a task began
    TaskStarted,
    /// A task settled as COMPLETED
    TaskCompleted,
    /// A task settled as FAILED (still eligible for manual retry)
    TaskFailed,
    /// A retry attempt is about to run
    RetryAttempted,
    /// A task settled as DEAD_LETTER and was forwarded to the DLQ
    MovedToDlq,
    /// An admin flow resubmitted a task out of the DLQ
    RecoveredFromDlq,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::TaskCreated => "TASK_CREATED",
            EventType::TaskStarted => "TASK_STARTED",
            EventType::TaskCompleted => "TASK_COMPLETED",
            EventType::TaskFailed => "TASK_FAILED",
            EventType::RetryAttempted => "RETRY_ATTEMPTED",
            EventType::MovedToDlq => "MOVED_TO_DLQ",
            EventType::RecoveredFromDlq => "RECOVERED_FROM_DLQ",
        };
        f.write_str(s)
    }
}

/// An event in the task execution lifecycle.
///
/// The wire form is `{taskId, taskType, eventType, metadata, timestamp}`,
/// keyed by `task_id` so a subscriber sees per-task order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    /// Id of the task the event belongs to
    pub task_id: String,
    /// Type of the task
    pub task_type: String,
    /// What happened
    pub event_type: EventType,
    /// Event-specific data
    pub metadata: Map<String, Value>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// Builds an event with explicit metadata.
    pub fn new(
        task: &Task,
        event_type: EventType,
        metadata: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_type: task.task_type.clone(),
            event_type,
            metadata,
            timestamp,
        }
    }

    /// Event for a freshly accepted task.
    pub fn task_created(task: &Task, timestamp: DateTime<Utc>) -> Self {
        Self::new(task, EventType::TaskCreated, Map::new(), timestamp)
    }

    /// Event for a task entering IN_PROGRESS.
    pub fn task_started(task: &Task, timestamp: DateTime<Utc>) -> Self {
        Self::new(task, EventType::TaskStarted, Map::new(), timestamp)
    }

    /// Terminal event for a COMPLETED settlement.
    pub fn task_completed(
        task: &Task,
        result: &Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut metadata = base_metadata(task);
        metadata.insert("result".to_string(), Value::Object(result.clone()));
        Self::new(task, EventType::TaskCompleted, metadata, timestamp)
    }

    /// Terminal event for a FAILED settlement.
    pub fn task_failed(task: &Task, error: &str, timestamp: DateTime<Utc>) -> Self {
        let mut metadata = base_metadata(task);
        metadata.insert("error".to_string(), json!(error));
        metadata.insert("retryable".to_string(), json!(true));
        Self::new(task, EventType::TaskFailed, metadata, timestamp)
    }

    /// Event emitted before each retry attempt.
    pub fn retry_attempted(
        task: &Task,
        attempt: u32,
        error: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut metadata = base_metadata(task);
        metadata.insert("attempt".to_string(), json!(attempt));
        metadata.insert("error".to_string(), json!(error));
        Self::new(task, EventType::RetryAttempted, metadata, timestamp)
    }

    /// Event for a task handed to the dead-letter queue.
    pub fn moved_to_dlq(task: &Task, metadata: Map<String, Value>, timestamp: DateTime<Utc>) -> Self {
        Self::new(task, EventType::MovedToDlq, metadata, timestamp)
    }

    /// Event for an admin resubmission out of the DLQ.
    pub fn recovered_from_dlq(task: &Task, timestamp: DateTime<Utc>) -> Self {
        Self::new(task, EventType::RecoveredFromDlq, base_metadata(task), timestamp)
    }
}

fn base_metadata(task: &Task) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("taskType".to_string(), json!(task.task_type));
    metadata.insert("retryCount".to_string(), json!(task.retry_count));
    metadata
}
