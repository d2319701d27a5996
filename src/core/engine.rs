//! Execution engine: the lifecycle coordinator.
//!
//! One entry point, [`ExecutionEngine::execute`], drives a task from
//! IN_PROGRESS to a terminal settlement. Persistence of a status always
//! precedes emission of the matching event, per task; across tasks nothing
//! is ordered.

use crate::clock::Clock;
use crate::core::dlq::DeadLetterProcessor;
use crate::core::publisher::EventPublisher;
use crate::core::registry::TaskHandler;
use crate::core::retry::{RetryOutcome, RetryStrategy};
use crate::error::{EngineError, EngineResult};
use crate::event::TaskEvent;
use crate::store::TaskStore;
use crate::task::{Task, TaskResult, TaskStatus};
use std::sync::Arc;
use tokio::time::timeout;

/// Orchestrates a single task execution: persist, run, emit, settle.
pub struct ExecutionEngine {
    store: Arc<dyn TaskStore>,
    publisher: Arc<EventPublisher>,
    dlq: Arc<DeadLetterProcessor>,
    retry: RetryStrategy,
    clock: Arc<dyn Clock>,
}

impl ExecutionEngine {
    /// Wires the engine from its collaborators.
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: Arc<EventPublisher>,
        dlq: Arc<DeadLetterProcessor>,
        retry: RetryStrategy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            dlq,
            retry,
            clock,
        }
    }

    /// Executes a task with the given handler and settles its final status.
    ///
    /// Returns the settled [`TaskResult`]. Errors are surfaced only for
    /// invalid input and for a store failure while marking the task
    /// started; handler errors are converted to `Failure` results, and
    /// sink failures never change the outcome.
    pub async fn execute(
        &self,
        task: &Task,
        handler: Arc<dyn TaskHandler>,
    ) -> EngineResult<TaskResult> {
        validate(task)?;

        let started = self.mark_started(task).await?;
        let outcome = self.run_attempts(&started, handler).await?;
        self.settle(&started, outcome).await
    }

    /// Transitions the task to IN_PROGRESS. A store failure here aborts
    /// the execution with no event emitted.
    async fn mark_started(&self, task: &Task) -> EngineResult<Task> {
        let started = task.with_status(TaskStatus::InProgress, self.clock.now());
        let saved = self.store.save(&started).await?;

        self.publisher
            .publish(TaskEvent::task_started(&saved, self.clock.now()))
            .await;
        Ok(saved)
    }

    async fn run_attempts(
        &self,
        task: &Task,
        handler: Arc<dyn TaskHandler>,
    ) -> EngineResult<RetryOutcome> {
        let attempt_timeout = self.retry.policy().attempt_timeout();

        self.retry
            .execute_with_retry(task, move |t| {
                let handler = Arc::clone(&handler);
                async move {
                    match timeout(attempt_timeout, handler.execute(&t)).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!(
                                task_id = %t.task_id,
                                timeout_ms = attempt_timeout.as_millis() as u64,
                                "handler attempt timed out"
                            );
                            Err(EngineError::Timeout {
                                timeout: attempt_timeout,
                            })
                        }
                    }
                }
            })
            .await
    }

    /// Maps the retry outcome to a final status, persists it, then emits
    /// the terminal event. `retry_count` gains one per attempt beyond the
    /// first, so it only moves at settle and never decreases.
    async fn settle(&self, task: &Task, outcome: RetryOutcome) -> EngineResult<TaskResult> {
        let now = self.clock.now();
        let retry_count = task.retry_count + outcome.attempts.saturating_sub(1);
        let settled = task.with_retry_count(retry_count, now);

        match &outcome.result {
            TaskResult::Success { result, .. } => {
                tracing::info!(task_id = %task.task_id, "task executed successfully");
                let completed = settled.with_status(TaskStatus::Completed, now);
                match self.store.save(&completed).await {
                    Ok(saved) => {
                        self.publisher
                            .publish(TaskEvent::task_completed(&saved, result, self.clock.now()))
                            .await;
                    }
                    Err(e) => self.report_settle_failure(&completed, &e).await,
                }
            }
            TaskResult::Failure {
                error,
                retryable: true,
                ..
            } => {
                tracing::warn!(task_id = %task.task_id, error = %error, "task failed, eligible for retry");
                let failed = settled.with_status(TaskStatus::Failed, now);
                match self.store.save(&failed).await {
                    Ok(saved) => {
                        self.publisher
                            .publish(TaskEvent::task_failed(&saved, error, self.clock.now()))
                            .await;
                    }
                    Err(e) => self.report_settle_failure(&failed, &e).await,
                }
            }
            TaskResult::Failure {
                error,
                retryable: false,
                ..
            } => {
                // The dead-letter processor owns the terminal save and the
                // MOVED_TO_DLQ event, so exactly one of each occurs.
                let cause = match outcome.cause {
                    Some(cause) => cause,
                    None => EngineError::handler(error.clone()),
                };
                if let Err(e) = self.dlq.process(&settled, &cause).await {
                    self.report_settle_failure(&settled, &e).await;
                }
            }
        }

        Ok(outcome.result)
    }

    /// Settle-time store failures do not change the caller-visible result;
    /// they are logged and a best-effort failure event is emitted.
    async fn report_settle_failure(&self, task: &Task, error: &EngineError) {
        tracing::error!(
            task_id = %task.task_id,
            error = %error,
            "failed to persist settled task status"
        );
        self.publisher
            .publish(TaskEvent::task_failed(
                task,
                &format!("failed to persist final status: {error}"),
                self.clock.now(),
            ))
            .await;
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Checks the preconditions shared by every entry point.
pub(crate) fn validate(task: &Task) -> EngineResult<()> {
    if task.task_id.trim().is_empty() {
        return Err(EngineError::invalid("task id cannot be blank"));
    }
    if task.task_type.trim().is_empty() {
        return Err(EngineError::invalid("task type cannot be blank"));
    }
    Ok(())
}
