//! Persistence port for tasks.
//!
//! The engine only ever talks to [`TaskStore`]; a host wires in whichever
//! backend fits its deployment:
//! - [`MemoryStore`]: in-process, perfect for development and tests
//! - `PostgresStore` (feature `postgres-store`): relational store with a
//!   JSON column for task data

use crate::error::EngineResult;
use crate::task::{Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "postgres-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres-store")))]
pub mod postgres;

#[cfg(feature = "postgres-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres-store")))]
pub use postgres::PostgresStore;

/// Offset/limit window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Number of records to skip
    pub offset: u64,
    /// Maximum number of records to return
    pub limit: u64,
}

impl Page {
    /// First `limit` records.
    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Contract for task persistence.
///
/// `save` is an upsert keyed by `task_id`; re-saving an existing id
/// replaces the stored record. Update operations (`update_status`,
/// `increment_retry`) refresh `updated_at` themselves, mirroring SQL
/// `NOW()` semantics.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts or replaces a task, returning the stored record.
    async fn save(&self, task: &Task) -> EngineResult<Task>;

    /// Looks a task up by id.
    async fn find_by_id(&self, task_id: &str) -> EngineResult<Option<Task>>;

    /// Lists tasks in the given status, newest update first.
    async fn find_by_status(
        &self,
        status: TaskStatus,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>>;

    /// Lists tasks of the given type, newest update first.
    async fn find_by_type(&self, task_type: &str, page: Option<Page>) -> EngineResult<Vec<Task>>;

    /// Lists tasks matching both type and status.
    async fn find_by_type_and_status(
        &self,
        task_type: &str,
        status: TaskStatus,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>>;

    /// Counts stored tasks grouped by status.
    async fn count_by_status(&self) -> EngineResult<HashMap<TaskStatus, u64>>;

    /// Lists FAILED tasks whose retry count is below the given cap.
    async fn find_failed_for_retry(&self, max_retries: u32) -> EngineResult<Vec<Task>>;

    /// Lists IN_PROGRESS tasks not updated since the threshold, suggesting
    /// the executing process died.
    async fn find_stuck(&self, threshold: DateTime<Utc>) -> EngineResult<Vec<Task>>;

    /// Sets the status of a task, refreshing `updated_at`. Returns the
    /// number of records touched (0 when the id is unknown).
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> EngineResult<u64>;

    /// Increments the retry count of a task, refreshing `updated_at`.
    /// Returns the number of records touched.
    async fn increment_retry(&self, task_id: &str) -> EngineResult<u64>;

    /// Deletes COMPLETED tasks whose last update predates the threshold.
    /// Returns the number of records removed.
    async fn delete_completed_older_than(&self, threshold: DateTime<Utc>) -> EngineResult<u64>;
}
