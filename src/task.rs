//! Task domain model: the unit of work, its lifecycle status, and the
//! outcome produced by a handler run.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a task
pub type TaskId = String;

/// Lifecycle states of a task.
///
/// Normal execution moves a task PENDING → IN_PROGRESS → one of
/// {COMPLETED, FAILED, DEAD_LETTER}. FAILED and DEAD_LETTER tasks may
/// re-enter PENDING through an explicit admin retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is created but not yet started
    Pending,
    /// Task is currently being executed
    InProgress,
    /// Task has been successfully completed
    Completed,
    /// Task execution has failed but may be retried
    Failed,
    /// Task has permanently failed and been moved to the DLQ
    DeadLetter,
}

impl TaskStatus {
    /// True for statuses that end normal execution (COMPLETED, DEAD_LETTER).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::DeadLetter)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::DeadLetter => "DEAD_LETTER",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            "DEAD_LETTER" => Ok(TaskStatus::DeadLetter),
            other => Err(EngineError::invalid(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

/// A unit of asynchronous work.
///
/// `data` is an opaque JSON payload decoded lazily at the domain boundary;
/// the engine never interprets it. `updated_at` is refreshed on every
/// mutation and never precedes `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Globally unique task identifier (UUID recommended)
    pub task_id: TaskId,
    /// Handler selector
    #[serde(rename = "type")]
    pub task_type: String,
    /// Opaque structured payload
    pub data: Map<String, Value>,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Number of retries performed, monotonically non-decreasing
    pub retry_count: u32,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last mutated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns a copy with the new status and a refreshed `updated_at`.
    pub fn with_status(&self, status: TaskStatus, now: DateTime<Utc>) -> Task {
        Task {
            status,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Returns a copy with the given retry count and a refreshed `updated_at`.
    pub fn with_retry_count(&self, retry_count: u32, now: DateTime<Utc>) -> Task {
        Task {
            retry_count,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Returns a copy with the retry count incremented by one.
    pub fn increment_retry(&self, now: DateTime<Utc>) -> Task {
        self.with_retry_count(self.retry_count + 1, now)
    }
}

/// Outcome of a single handler run.
///
/// Settle performs an exhaustive match on this type: `Success` maps to
/// COMPLETED, a retryable `Failure` to FAILED, a non-retryable `Failure`
/// to DEAD_LETTER.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    /// The handler finished the work
    Success {
        /// Id of the completed task
        task_id: TaskId,
        /// Data produced by the handler
        result: Map<String, Value>,
    },
    /// The handler gave up
    Failure {
        /// Id of the failed task
        task_id: TaskId,
        /// Description of what went wrong
        error: String,
        /// Whether a later attempt may succeed
        retryable: bool,
    },
}

impl TaskResult {
    /// Id of the task this result belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            TaskResult::Success { task_id, .. } => task_id,
            TaskResult::Failure { task_id, .. } => task_id,
        }
    }

    /// Convenience constructor for a success with no payload.
    pub fn success(task_id: impl Into<TaskId>) -> Self {
        TaskResult::Success {
            task_id: task_id.into(),
            result: Map::new(),
        }
    }
}

/// Convenience builder for creating tasks with standard defaults.
///
/// New tasks get a random UUID id, PENDING status, zero retries and
/// matching created/updated timestamps unless overridden.
#[derive(Debug)]
pub struct TaskBuilder {
    task_id: TaskId,
    task_type: String,
    data: Map<String, Value>,
    status: TaskStatus,
    retry_count: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskBuilder {
    /// Starts a builder for the given task type.
    pub fn for_type(task_type: impl Into<String>) -> EngineResult<Self> {
        let task_type = task_type.into();
        if task_type.trim().is_empty() {
            return Err(EngineError::invalid("task type cannot be blank"));
        }
        let now = Utc::now();
        Ok(Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            task_type,
            data: Map::new(),
            status: TaskStatus::Pending,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Overrides the generated task id.
    pub fn with_task_id(mut self, task_id: impl Into<TaskId>) -> EngineResult<Self> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(EngineError::invalid("task id cannot be blank"));
        }
        self.task_id = task_id;
        Ok(self)
    }

    /// Adds a single entry to the task payload.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> EngineResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(EngineError::invalid("data key cannot be blank"));
        }
        self.data.insert(key, value);
        Ok(self)
    }

    /// Merges a map of entries into the task payload.
    pub fn with_data_map(mut self, data: Map<String, Value>) -> Self {
        self.data.extend(data);
        self
    }

    /// Sets a non-default initial status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets a specific retry count.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets explicit timestamps; `updated_at` must not precede `created_at`.
    pub fn with_timestamps(
        mut self,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if updated_at < created_at {
            return Err(EngineError::invalid(
                "updated timestamp cannot be before created timestamp",
            ));
        }
        self.created_at = created_at;
        self.updated_at = updated_at;
        Ok(self)
    }

    /// Builds the task.
    pub fn build(self) -> Task {
        Task {
            task_id: self.task_id,
            task_type: self.task_type,
            data: self.data,
            status: self.status,
            retry_count: self.retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn builder_applies_defaults() {
        let task = TaskBuilder::for_type("EMAIL").unwrap().build();

        assert!(!task.task_id.is_empty());
        assert_eq!(task.task_type, "EMAIL");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.created_at, task.updated_at);
        assert!(task.data.is_empty());
    }

    #[test]
    fn builder_rejects_blank_type() {
        assert!(TaskBuilder::for_type("   ").is_err());
    }

    #[test]
    fn builder_rejects_blank_id_and_key() {
        let builder = TaskBuilder::for_type("EMAIL").unwrap();
        assert!(builder.with_task_id("  ").is_err());

        let builder = TaskBuilder::for_type("EMAIL").unwrap();
        assert!(builder.with_data("", json!(1)).is_err());
    }

    #[test]
    fn builder_rejects_inverted_timestamps() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(10);
        let builder = TaskBuilder::for_type("EMAIL").unwrap();
        assert!(builder.with_timestamps(now, earlier).is_err());
    }

    #[test]
    fn builder_collects_data() {
        let task = TaskBuilder::for_type("EMAIL")
            .unwrap()
            .with_task_id("t-1")
            .unwrap()
            .with_data("to", json!("user@example.com"))
            .unwrap()
            .with_data("attempts", json!(2))
            .unwrap()
            .build();

        assert_eq!(task.task_id, "t-1");
        assert_eq!(task.data["to"], json!("user@example.com"));
        assert_eq!(task.data["attempts"], json!(2));
    }

    #[test]
    fn with_status_refreshes_updated_at() {
        let task = TaskBuilder::for_type("EMAIL").unwrap().build();
        let later = task.updated_at + Duration::seconds(5);

        let started = task.with_status(TaskStatus::InProgress, later);

        assert_eq!(started.status, TaskStatus::InProgress);
        assert_eq!(started.updated_at, later);
        assert_eq!(started.created_at, task.created_at);
        assert_eq!(started.task_id, task.task_id);
    }

    #[test]
    fn increment_retry_is_monotonic() {
        let task = TaskBuilder::for_type("EMAIL").unwrap().build();
        let now = Utc::now();

        let once = task.increment_retry(now);
        let twice = once.increment_retry(now);

        assert_eq!(once.retry_count, 1);
        assert_eq!(twice.retry_count, 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::DeadLetter.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::DeadLetter,
        ] {
            let parsed: TaskStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("RUNNING".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn wire_format_uses_camel_case_and_screaming_statuses() {
        let task = TaskBuilder::for_type("EMAIL")
            .unwrap()
            .with_task_id("t-1")
            .unwrap()
            .with_status(TaskStatus::InProgress)
            .build();

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["taskId"], json!("t-1"));
        assert_eq!(value["type"], json!("EMAIL"));
        assert_eq!(value["status"], json!("IN_PROGRESS"));
        assert_eq!(value["retryCount"], json!(0));
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn result_exposes_task_id() {
        let ok = TaskResult::success("t-1");
        let fail = TaskResult::Failure {
            task_id: "t-2".to_string(),
            error: "boom".to_string(),
            retryable: true,
        };

        assert_eq!(ok.task_id(), "t-1");
        assert_eq!(fail.task_id(), "t-2");
    }
}
