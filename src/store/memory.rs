//! In-memory task store.
//!
//! Keeps every task in a map behind an async lock. Suitable for
//! development, tests and single-process hosts that do not need durability
//! across restarts.

use super::{Page, TaskStore};
use crate::clock::{Clock, SystemClock};
use crate::error::EngineResult;
use crate::task::{Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory [`TaskStore`] implementation.
pub struct MemoryStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// True when no task is stored.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    fn paginate(mut tasks: Vec<Task>, page: Option<Page>) -> Vec<Task> {
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        match page {
            Some(page) => tasks
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect(),
            None => tasks,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn save(&self, task: &Task) -> EngineResult<Task> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.task_id.clone(), task.clone());
        tracing::debug!(task_id = %task.task_id, status = %task.status, "saved task");
        Ok(task.clone())
    }

    async fn find_by_id(&self, task_id: &str) -> EngineResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).cloned())
    }

    async fn find_by_status(
        &self,
        status: TaskStatus,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let matching = tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        Ok(Self::paginate(matching, page))
    }

    async fn find_by_type(&self, task_type: &str, page: Option<Page>) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let matching = tasks
            .values()
            .filter(|t| t.task_type == task_type)
            .cloned()
            .collect();
        Ok(Self::paginate(matching, page))
    }

    async fn find_by_type_and_status(
        &self,
        task_type: &str,
        status: TaskStatus,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let matching = tasks
            .values()
            .filter(|t| t.task_type == task_type && t.status == status)
            .cloned()
            .collect();
        Ok(Self::paginate(matching, page))
    }

    async fn count_by_status(&self) -> EngineResult<HashMap<TaskStatus, u64>> {
        let tasks = self.tasks.read().await;
        let mut counts = HashMap::new();
        for task in tasks.values() {
            *counts.entry(task.status).or_insert(0u64) += 1;
        }
        Ok(counts)
    }

    async fn find_failed_for_retry(&self, max_retries: u32) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let matching = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed && t.retry_count < max_retries)
            .cloned()
            .collect();
        Ok(Self::paginate(matching, None))
    }

    async fn find_stuck(&self, threshold: DateTime<Utc>) -> EngineResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let matching = tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress && t.updated_at < threshold)
            .cloned()
            .collect();
        Ok(Self::paginate(matching, None))
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> EngineResult<u64> {
        let now = self.clock.now();
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(task) => {
                task.status = status;
                task.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn increment_retry(&self, task_id: &str) -> EngineResult<u64> {
        let now = self.clock.now();
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(task) => {
                task.retry_count += 1;
                task.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_completed_older_than(&self, threshold: DateTime<Utc>) -> EngineResult<u64> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| !(t.status == TaskStatus::Completed && t.updated_at < threshold));
        Ok((before - tasks.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::task::TaskBuilder;
    use chrono::Duration;

    fn task(id: &str, task_type: &str, status: TaskStatus) -> Task {
        TaskBuilder::for_type(task_type)
            .unwrap()
            .with_task_id(id)
            .unwrap()
            .with_status(status)
            .build()
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = MemoryStore::new();
        let t = task("t-1", "EMAIL", TaskStatus::Pending);

        store.save(&t).await.unwrap();
        assert_eq!(store.len().await, 1);

        let updated = t.with_status(TaskStatus::Completed, Utc::now());
        store.save(&updated).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_by_id("t-1").await.unwrap().unwrap();
        assert_eq!(found.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn find_by_id_misses_return_none() {
        let store = MemoryStore::new();
        assert!(store.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn queries_filter_by_status_and_type() {
        let store = MemoryStore::new();
        store
            .save(&task("t-1", "EMAIL", TaskStatus::Pending))
            .await
            .unwrap();
        store
            .save(&task("t-2", "EMAIL", TaskStatus::Failed))
            .await
            .unwrap();
        store
            .save(&task("t-3", "EXPORT", TaskStatus::Failed))
            .await
            .unwrap();

        let failed = store
            .find_by_status(TaskStatus::Failed, None)
            .await
            .unwrap();
        assert_eq!(failed.len(), 2);

        let emails = store.find_by_type("EMAIL", None).await.unwrap();
        assert_eq!(emails.len(), 2);

        let failed_emails = store
            .find_by_type_and_status("EMAIL", TaskStatus::Failed, None)
            .await
            .unwrap();
        assert_eq!(failed_emails.len(), 1);
        assert_eq!(failed_emails[0].task_id, "t-2");
    }

    #[tokio::test]
    async fn pagination_windows_results() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .save(&task(&format!("t-{i}"), "EMAIL", TaskStatus::Pending))
                .await
                .unwrap();
        }

        let first_two = store
            .find_by_status(TaskStatus::Pending, Some(Page::first(2)))
            .await
            .unwrap();
        assert_eq!(first_two.len(), 2);

        let rest = store
            .find_by_status(TaskStatus::Pending, Some(Page { offset: 2, limit: 10 }))
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn count_by_status_groups_everything() {
        let store = MemoryStore::new();
        store
            .save(&task("t-1", "EMAIL", TaskStatus::Pending))
            .await
            .unwrap();
        store
            .save(&task("t-2", "EMAIL", TaskStatus::Pending))
            .await
            .unwrap();
        store
            .save(&task("t-3", "EMAIL", TaskStatus::DeadLetter))
            .await
            .unwrap();

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts[&TaskStatus::Pending], 2);
        assert_eq!(counts[&TaskStatus::DeadLetter], 1);
        assert!(counts.get(&TaskStatus::Completed).is_none());
    }

    #[tokio::test]
    async fn update_status_refreshes_updated_at() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::starting_at(start));
        let store = MemoryStore::with_clock(clock.clone());

        let t = task("t-1", "EMAIL", TaskStatus::Pending);
        store.save(&t).await.unwrap();

        clock.advance(Duration::seconds(30));
        let touched = store
            .update_status("t-1", TaskStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let found = store.find_by_id("t-1").await.unwrap().unwrap();
        assert_eq!(found.status, TaskStatus::InProgress);
        assert_eq!(found.updated_at, start + Duration::seconds(30));

        assert_eq!(
            store
                .update_status("missing", TaskStatus::Failed)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn increment_retry_bumps_count() {
        let store = MemoryStore::new();
        store
            .save(&task("t-1", "EMAIL", TaskStatus::Failed))
            .await
            .unwrap();

        store.increment_retry("t-1").await.unwrap();
        store.increment_retry("t-1").await.unwrap();

        let found = store.find_by_id("t-1").await.unwrap().unwrap();
        assert_eq!(found.retry_count, 2);
    }

    #[tokio::test]
    async fn failed_for_retry_respects_cap() {
        let store = MemoryStore::new();
        let fresh = task("t-1", "EMAIL", TaskStatus::Failed);
        let exhausted = TaskBuilder::for_type("EMAIL")
            .unwrap()
            .with_task_id("t-2")
            .unwrap()
            .with_status(TaskStatus::Failed)
            .with_retry_count(3)
            .build();
        store.save(&fresh).await.unwrap();
        store.save(&exhausted).await.unwrap();

        let eligible = store.find_failed_for_retry(3).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].task_id, "t-1");
    }

    #[tokio::test]
    async fn stuck_detection_uses_updated_at() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::starting_at(start));
        let store = MemoryStore::with_clock(clock.clone());

        let stale = task("t-1", "EMAIL", TaskStatus::InProgress);
        store.save(&stale).await.unwrap();

        let fresh = task("t-2", "EMAIL", TaskStatus::InProgress)
            .with_status(TaskStatus::InProgress, start + Duration::minutes(10));
        store.save(&fresh).await.unwrap();

        let stuck = store
            .find_stuck(start + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].task_id, "t-1");
    }

    #[tokio::test]
    async fn cleanup_only_touches_old_completed_tasks() {
        let start = Utc::now();
        let store = MemoryStore::new();

        let old_done = task("t-1", "EMAIL", TaskStatus::Completed)
            .with_status(TaskStatus::Completed, start - Duration::hours(2));
        let recent_done = task("t-2", "EMAIL", TaskStatus::Completed)
            .with_status(TaskStatus::Completed, start);
        let old_failed = task("t-3", "EMAIL", TaskStatus::Failed)
            .with_status(TaskStatus::Failed, start - Duration::hours(2));
        store.save(&old_done).await.unwrap();
        store.save(&recent_done).await.unwrap();
        store.save(&old_failed).await.unwrap();

        let removed = store
            .delete_completed_older_than(start - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.find_by_id("t-1").await.unwrap().is_none());
        assert!(store.find_by_id("t-2").await.unwrap().is_some());
        assert!(store.find_by_id("t-3").await.unwrap().is_some());
    }
}
