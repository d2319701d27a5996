//! Task administration: queries, manual retries, stuck-task recovery and
//! maintenance over the same ports the engine runs on.

use crate::clock::Clock;
use crate::core::engine::validate;
use crate::core::publisher::EventPublisher;
use crate::core::registry::HandlerRegistry;
use crate::core::ExecutionEngine;
use crate::error::{EngineError, EngineResult};
use crate::event::TaskEvent;
use crate::store::{Page, TaskStore};
use crate::task::{Task, TaskResult, TaskStatus};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

/// Filter for [`TaskAdminService::find_tasks`]. Unset fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to one status
    pub status: Option<TaskStatus>,
    /// Restrict to one task type
    pub task_type: Option<String>,
    /// Pagination window
    pub page: Option<Page>,
}

/// Administration and maintenance over a task table.
pub struct TaskAdminService {
    store: Arc<dyn TaskStore>,
    registry: Arc<HandlerRegistry>,
    engine: Arc<ExecutionEngine>,
    publisher: Arc<EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl TaskAdminService {
    /// Wires the admin service over the engine's components.
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<HandlerRegistry>,
        engine: Arc<ExecutionEngine>,
        publisher: Arc<EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            publisher,
            clock,
        }
    }

    /// Lists tasks matching the filter.
    pub async fn find_tasks(&self, filter: &TaskFilter) -> EngineResult<Vec<Task>> {
        match (&filter.task_type, filter.status) {
            (Some(task_type), Some(status)) => {
                self.store
                    .find_by_type_and_status(task_type, status, filter.page)
                    .await
            }
            (Some(task_type), None) => self.store.find_by_type(task_type, filter.page).await,
            (None, Some(status)) => self.store.find_by_status(status, filter.page).await,
            (None, None) => Err(EngineError::invalid(
                "task filter needs at least a status or a type",
            )),
        }
    }

    /// Looks a task up by id, failing with NotFound when absent.
    pub async fn get_task(&self, task_id: &str) -> EngineResult<Task> {
        if task_id.trim().is_empty() {
            return Err(EngineError::invalid("task id cannot be blank"));
        }
        self.store
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Counts stored tasks grouped by status.
    pub async fn count_by_status(&self) -> EngineResult<HashMap<TaskStatus, u64>> {
        self.store.count_by_status().await
    }

    /// Manually retries a FAILED or DEAD_LETTER task.
    ///
    /// The task is reset to PENDING and pushed back through the engine; a
    /// task leaving DEAD_LETTER additionally emits `RECOVERED_FROM_DLQ`.
    pub async fn retry_task(&self, task_id: &str) -> EngineResult<TaskResult> {
        let task = self.get_task(task_id).await?;

        if task.status != TaskStatus::Failed && task.status != TaskStatus::DeadLetter {
            return Err(EngineError::invalid(format!(
                "task cannot be retried from status {}",
                task.status
            )));
        }

        let handler = self
            .registry
            .lookup(&task.task_type)
            .await?
            .ok_or_else(|| EngineError::HandlerNotFound {
                task_type: task.task_type.clone(),
            })?;

        tracing::info!(task_id = %task.task_id, from = %task.status, "retrying task");

        let was_dead_letter = task.status == TaskStatus::DeadLetter;
        let pending = task.with_status(TaskStatus::Pending, self.clock.now());
        let saved = self.store.save(&pending).await?;

        if was_dead_letter {
            self.publisher
                .publish(TaskEvent::recovered_from_dlq(&saved, self.clock.now()))
                .await;
        }

        self.engine.execute(&saved, handler).await
    }

    /// Retries every FAILED task below the retry cap. Returns the results
    /// in no particular order; tasks without a registered handler are
    /// skipped with a warning.
    pub async fn retry_failed(&self, max_retries: u32) -> EngineResult<Vec<TaskResult>> {
        let candidates = self.store.find_failed_for_retry(max_retries).await?;
        let mut results = Vec::with_capacity(candidates.len());

        for task in candidates {
            match self.retry_task(&task.task_id).await {
                Ok(result) => results.push(result),
                Err(EngineError::HandlerNotFound { task_type }) => {
                    tracing::warn!(task_id = %task.task_id, task_type = %task_type, "skipping retry, no handler");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Re-submits IN_PROGRESS tasks whose `updated_at` predates
    /// `now - older_than`, the signature of a dead executor.
    ///
    /// Returns the number of tasks re-submitted. Settle is idempotent by
    /// final status, so racing a still-alive executor is only observable
    /// to non-idempotent handlers, which is the host's contract.
    pub async fn recover_stuck(&self, older_than: Duration) -> EngineResult<u64> {
        let threshold = self.clock.now() - older_than;
        let stuck = self.store.find_stuck(threshold).await?;
        let mut recovered = 0u64;

        for task in stuck {
            let handler = match self.registry.lookup(&task.task_type).await? {
                Some(handler) => handler,
                None => {
                    tracing::warn!(task_id = %task.task_id, task_type = %task.task_type, "skipping stuck task, no handler");
                    continue;
                }
            };

            tracing::info!(task_id = %task.task_id, "recovering stuck task");
            validate(&task)?;
            self.engine.execute(&task, handler).await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Deletes COMPLETED tasks whose last update predates
    /// `now - older_than`. Returns the number removed.
    pub async fn cleanup_completed(&self, older_than: Duration) -> EngineResult<u64> {
        let threshold = self.clock.now() - older_than;
        let removed = self.store.delete_completed_older_than(threshold).await?;
        if removed > 0 {
            tracing::info!(removed, "cleaned up completed tasks");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for TaskAdminService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskAdminService").finish_non_exhaustive()
    }
}
