//! The engine core: handler registry, retry strategy, execution engine,
//! dead-letter processor and event publisher, wired together by
//! [`TaskEngine`].

use crate::admin::TaskAdminService;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::core::engine::validate;
use crate::error::{EngineError, EngineResult};
use crate::event::TaskEvent;
use crate::sink::{DlqSink, EventSink};
use crate::store::TaskStore;
use crate::task::{Task, TaskResult};
use std::sync::Arc;

pub mod dlq;
pub mod engine;
pub mod publisher;
pub mod registry;
pub mod retry;

pub use dlq::DeadLetterProcessor;
pub use engine::ExecutionEngine;
pub use publisher::EventPublisher;
pub use registry::{HandlerRegistry, TaskHandler};
pub use retry::{RetryOutcome, RetryStrategy};

/// The embeddable engine a host wires into its service.
///
/// Owns the handler registry and the execution pipeline over the ports the
/// host supplies: a task store, an event sink, and a DLQ sink.
///
/// # Examples
///
/// ```rust,no_run
/// use duratask::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example(handler: Arc<dyn TaskHandler>) -> EngineResult<()> {
/// let store = Arc::new(MemoryStore::new());
/// let sink = MemorySink::shared();
///
/// let engine = TaskEngine::new(EngineConfig::default(), store, sink.clone(), sink)?;
/// engine.register_handler(handler).await?;
///
/// let task = TaskBuilder::for_type("EMAIL")?
///     .with_data("to", serde_json::json!("user@example.com"))?
///     .build();
/// let result = engine.submit(task).await?;
/// # let _ = result;
/// # Ok(())
/// # }
/// ```
pub struct TaskEngine {
    config: EngineConfig,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn TaskStore>,
    publisher: Arc<EventPublisher>,
    engine: Arc<ExecutionEngine>,
    clock: Arc<dyn Clock>,
}

impl TaskEngine {
    /// Wires an engine from its configuration and ports, on the system
    /// clock.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        event_sink: Arc<dyn EventSink>,
        dlq_sink: Arc<dyn DlqSink>,
    ) -> EngineResult<Self> {
        Self::with_clock(config, store, event_sink, dlq_sink, Arc::new(SystemClock))
    }

    /// Wires an engine on an explicit clock. Tests use this with a
    /// [`ManualClock`](crate::clock::ManualClock).
    pub fn with_clock(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        event_sink: Arc<dyn EventSink>,
        dlq_sink: Arc<dyn DlqSink>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        if let Err(errors) = config.validate() {
            return Err(EngineError::config(errors.join("; ")));
        }

        let publisher = Arc::new(EventPublisher::new(event_sink, config.events_topic.clone()));
        let dlq = Arc::new(DeadLetterProcessor::new(
            store.clone(),
            publisher.clone(),
            dlq_sink,
            config.dlq_topic.clone(),
            clock.clone(),
        ));
        let retry = RetryStrategy::new(config.retry.clone(), clock.clone())
            .with_publisher(publisher.clone());
        let engine = Arc::new(ExecutionEngine::new(
            store.clone(),
            publisher.clone(),
            dlq,
            retry,
            clock.clone(),
        ));

        tracing::info!(
            events_topic = %config.events_topic,
            dlq_topic = %config.dlq_topic,
            max_retries = config.retry.max_retries,
            "task engine wired"
        );

        Ok(Self {
            config,
            registry: Arc::new(HandlerRegistry::new()),
            store,
            publisher,
            engine,
            clock,
        })
    }

    /// Registers a handler for its task type.
    pub async fn register_handler(&self, handler: Arc<dyn TaskHandler>) -> EngineResult<()> {
        self.registry.register(handler).await
    }

    /// Submits a task for execution.
    ///
    /// Submission is idempotent with respect to the stored record: a task
    /// id already known to the store re-executes the stored task instead
    /// of overwriting it; a new id is persisted PENDING and a
    /// `TASK_CREATED` event is emitted. The handler is selected by the
    /// task's type.
    pub async fn submit(&self, task: Task) -> EngineResult<TaskResult> {
        validate(&task)?;

        let stored = match self.store.find_by_id(&task.task_id).await? {
            Some(existing) => {
                tracing::debug!(task_id = %existing.task_id, "task already known, reusing stored record");
                existing
            }
            None => {
                let saved = self.store.save(&task).await?;
                self.publisher
                    .publish(TaskEvent::task_created(&saved, self.clock.now()))
                    .await;
                saved
            }
        };

        let handler = self
            .registry
            .lookup(&stored.task_type)
            .await?
            .ok_or_else(|| EngineError::HandlerNotFound {
                task_type: stored.task_type.clone(),
            })?;

        self.engine.execute(&stored, handler).await
    }

    /// Executes a task with an explicit handler, bypassing the registry.
    pub async fn execute(
        &self,
        task: &Task,
        handler: Arc<dyn TaskHandler>,
    ) -> EngineResult<TaskResult> {
        self.engine.execute(task, handler).await
    }

    /// Looks up a task's current stored state.
    pub async fn task(&self, task_id: &str) -> EngineResult<Task> {
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

    /// Builds the admin service over this engine's components.
    pub fn admin(&self) -> TaskAdminService {
        TaskAdminService::new(
            self.store.clone(),
            self.registry.clone(),
            self.engine.clone(),
            self.publisher.clone(),
            self.clock.clone(),
        )
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The configuration this engine runs under.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
