//! Retry strategy: bounded exponential-backoff execution of a handler
//! attempt.

use crate::clock::Clock;
use crate::config::RetryPolicy;
use crate::core::publisher::EventPublisher;
use crate::error::{EngineError, EngineResult};
use crate::event::TaskEvent;
use crate::task::{Task, TaskResult};
use crate::utils::backoff_delay;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;

/// What a retried execution produced.
///
/// `attempts` counts handler invocations (the first attempt included) so
/// the engine can settle `retry_count`. `cause` carries the terminal error
/// for dead-letter enrichment; it is `None` when the handler returned a
/// result instead of failing with an error.
#[derive(Debug)]
pub struct RetryOutcome {
    /// The settled result
    pub result: TaskResult,
    /// Number of handler invocations performed
    pub attempts: u32,
    /// The error that ended the attempt loop, if any
    pub cause: Option<EngineError>,
}

/// Runs a handler attempt with bounded exponential-backoff retry.
///
/// A failure is retried only when its error chain contains a retryable
/// class and the retry cap is not exhausted; everything else ends the loop
/// immediately. The terminal failure is reported as a
/// [`TaskResult::Failure`] so handler errors never escape the pipeline.
pub struct RetryStrategy {
    policy: RetryPolicy,
    publisher: Option<Arc<EventPublisher>>,
    clock: Arc<dyn Clock>,
}

impl RetryStrategy {
    /// Creates a strategy with the given policy and clock.
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            publisher: None,
            clock,
        }
    }

    /// Wires a publisher so each retry emits a `RETRY_ATTEMPTED` event.
    pub fn with_publisher(mut self, publisher: Arc<EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// The policy this strategy runs under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invokes `execution` until it succeeds, fails terminally, or the
    /// retry cap is reached.
    ///
    /// Attempt `n` runs for `n` in `1..=max_retries + 1`; between retryable
    /// failures the loop sleeps `min(max_delay, base_delay * 2^(n-1))`
    /// (jittered when enabled). A retryable error exhausted to the cap is
    /// still reported with `retryable = true`, so the engine records FAILED
    /// rather than DEAD_LETTER.
    pub async fn execute_with_retry<F, Fut>(
        &self,
        task: &Task,
        mut execution: F,
    ) -> EngineResult<RetryOutcome>
    where
        F: FnMut(Task) -> Fut + Send,
        Fut: Future<Output = EngineResult<TaskResult>> + Send,
    {
        if task.task_id.trim().is_empty() {
            return Err(EngineError::invalid("task id cannot be blank"));
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(task_id = %task.task_id, attempt, "executing task attempt");

            let error = match execution(task.clone()).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt,
                        cause: None,
                    });
                }
                Err(error) => error,
            };

            let retryable = error.is_retryable();
            if retryable && attempt <= self.policy.max_retries {
                let delay = backoff_delay(attempt, &self.policy);
                tracing::info!(
                    task_id = %task.task_id,
                    attempt,
                    max_retries = self.policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying task"
                );
                if let Some(publisher) = &self.publisher {
                    publisher
                        .publish(TaskEvent::retry_attempted(
                            task,
                            attempt,
                            &error.to_string(),
                            self.clock.now(),
                        ))
                        .await;
                }
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                continue;
            }

            tracing::error!(
                task_id = %task.task_id,
                attempts = attempt,
                retryable,
                error = %error,
                "task execution failed"
            );
            let message = format!("Execution failed after {attempt} attempts: {error}");
            return Ok(RetryOutcome {
                result: TaskResult::Failure {
                    task_id: task.task_id.clone(),
                    error: message,
                    retryable,
                },
                attempts: attempt,
                cause: Some(error),
            });
        }
    }
}

impl std::fmt::Debug for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryStrategy")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::sink::MemorySink;
    use crate::task::TaskBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn strategy(max_retries: u32) -> RetryStrategy {
        RetryStrategy::new(
            RetryPolicy {
                max_retries,
                base_delay_ms: 0,
                max_delay_ms: 0,
                attempt_timeout_ms: 1_000,
                enable_jitter: false,
            },
            Arc::new(SystemClock),
        )
    }

    fn sample_task() -> Task {
        TaskBuilder::for_type("EMAIL")
            .unwrap()
            .with_task_id("t-1")
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let task = sample_task();
        let calls = AtomicU32::new(0);

        let outcome = strategy(3)
            .execute_with_retry(&task, |t| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(TaskResult::success(t.task_id)) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.cause.is_none());
        assert!(matches!(outcome.result, TaskResult::Success { .. }));
    }

    #[tokio::test]
    async fn retryable_failures_then_success() {
        let task = sample_task();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = Arc::clone(&calls);
        let outcome = strategy(3)
            .execute_with_retry(&task, move |t| {
                let n = calls_in.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::retryable("transient"))
                    } else {
                        Ok(TaskResult::success(t.task_id))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        assert!(matches!(outcome.result, TaskResult::Success { .. }));
    }

    #[tokio::test]
    async fn non_retryable_failure_skips_remaining_attempts() {
        let task = sample_task();
        let calls = AtomicU32::new(0);

        let outcome = strategy(3)
            .execute_with_retry(&task, |_t| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(EngineError::handler("corrupt payload")) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        match &outcome.result {
            TaskResult::Failure {
                error, retryable, ..
            } => {
                assert!(!retryable);
                assert!(error.starts_with("Execution failed after 1 attempts:"));
                assert!(error.contains("corrupt payload"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(outcome.cause.as_ref().unwrap().kind(), "handler");
    }

    #[tokio::test]
    async fn exhausted_retries_stay_marked_retryable() {
        let task = sample_task();
        let calls = AtomicU32::new(0);

        let outcome = strategy(2)
            .execute_with_retry(&task, |_t| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(EngineError::retryable("still down")) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        match &outcome.result {
            TaskResult::Failure {
                error, retryable, ..
            } => {
                assert!(retryable);
                assert!(error.starts_with("Execution failed after 3 attempts:"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrapped_retryable_cause_is_recognized() {
        let task = sample_task();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = Arc::clone(&calls);
        let outcome = strategy(3)
            .execute_with_retry(&task, move |t| {
                let n = calls_in.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(EngineError::handler_with(
                            "fetch failed",
                            EngineError::retryable("connection reset"),
                        ))
                    } else {
                        Ok(TaskResult::success(t.task_id))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(outcome.result, TaskResult::Success { .. }));
    }

    #[tokio::test]
    async fn handler_returned_failure_passes_through_without_retry() {
        let task = sample_task();
        let calls = AtomicU32::new(0);

        let outcome = strategy(3)
            .execute_with_retry(&task, |t| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(TaskResult::Failure {
                        task_id: t.task_id,
                        error: "declined".to_string(),
                        retryable: false,
                    })
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.cause.is_none());
        assert!(matches!(
            outcome.result,
            TaskResult::Failure {
                retryable: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn blank_task_id_fails_before_any_attempt() {
        let mut task = sample_task();
        task.task_id = "  ".to_string();
        let calls = AtomicU32::new(0);

        let result = strategy(3)
            .execute_with_retry(&task, |t| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(TaskResult::success(t.task_id)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_emit_retry_attempted_events() {
        let sink = MemorySink::shared();
        let publisher = Arc::new(EventPublisher::new(sink.clone(), "task-events"));
        let strategy = strategy(3).with_publisher(publisher);

        let task = sample_task();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        strategy
            .execute_with_retry(&task, move |t| {
                let n = calls_in.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::retryable("transient"))
                    } else {
                        Ok(TaskResult::success(t.task_id))
                    }
                }
            })
            .await
            .unwrap();

        let messages = sink.messages().await;
        assert_eq!(messages.len(), 2);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(
                message.payload["eventType"],
                serde_json::json!("RETRY_ATTEMPTED")
            );
            assert_eq!(
                message.payload["metadata"]["attempt"],
                serde_json::json!(i as u32 + 1)
            );
        }
    }
}
