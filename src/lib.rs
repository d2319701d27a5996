//! # duratask
//!
//! An embeddable task execution engine for Rust services.
//!
//! Each host service owns its own task table; `duratask` supplies the
//! execution pipeline on top of it: the lifecycle state machine that takes
//! a submitted task, routes it to a registered handler, enforces retry
//! policy with exponential backoff, classifies failures as retryable vs
//! terminal, persists every transition, and publishes lifecycle events.
//!
//! ## Features
//!
//! - **Type-based dispatch**: handlers registered per task type, safely
//!   hot-swappable under concurrent load
//! - **Bounded retries**: exponential backoff with jitter; retryability is
//!   carried by the error chain, not control flow
//! - **Dead-letter handling**: non-retryable failures are persisted,
//!   audited and forwarded to a DLQ sink
//! - **At-least-once events**: every status is persisted before its event
//!   is emitted
//! - **Pluggable ports**: bring your own store and sinks, or use the
//!   in-memory defaults; `postgres-store` and `redis-sink` features add
//!   production backends
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use duratask::prelude::*;
//! use std::sync::Arc;
//!
//! struct EmailHandler;
//!
//! #[async_trait]
//! impl TaskHandler for EmailHandler {
//!     async fn execute(&self, task: &Task) -> EngineResult<TaskResult> {
//!         // Your task logic here; raise EngineError::retryable(..) for
//!         // failures worth another attempt.
//!         Ok(TaskResult::success(task.task_id.clone()))
//!     }
//!
//!     fn task_type(&self) -> &str {
//!         "EMAIL"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> EngineResult<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let sink = MemorySink::shared();
//!
//!     let engine = TaskEngine::new(EngineConfig::default(), store, sink.clone(), sink)?;
//!     engine.register_handler(Arc::new(EmailHandler)).await?;
//!
//!     let task = TaskBuilder::for_type("EMAIL")?
//!         .with_data("to", serde_json::json!("user@example.com"))?
//!         .build();
//!     let result = engine.submit(task).await?;
//!     println!("settled: {result:?}");
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod admin;
pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod schema;
pub mod sink;
pub mod store;
pub mod task;
pub mod utils;

pub mod prelude {
    //! Everything a host typically needs in scope.
    pub use crate::admin::{TaskAdminService, TaskFilter};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{EngineConfig, RetryPolicy, SchemaOptions};
    pub use crate::core::{HandlerRegistry, TaskEngine, TaskHandler};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::event::{EventType, TaskEvent};
    pub use crate::sink::{DlqSink, EventSink, MemorySink};
    pub use crate::store::{MemoryStore, Page, TaskStore};
    pub use crate::task::{Task, TaskBuilder, TaskId, TaskResult, TaskStatus};
    pub use async_trait::async_trait;

    #[cfg(feature = "postgres-store")]
    #[cfg_attr(docsrs, doc(cfg(feature = "postgres-store")))]
    pub use crate::store::PostgresStore;

    #[cfg(feature = "redis-sink")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-sink")))]
    pub use crate::sink::RedisStreamSink;
}

pub use crate::admin::{TaskAdminService, TaskFilter};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{EngineConfig, RetryPolicy, SchemaOptions};
pub use crate::core::{
    DeadLetterProcessor, EventPublisher, ExecutionEngine, HandlerRegistry, RetryOutcome,
    RetryStrategy, TaskEngine, TaskHandler,
};
pub use crate::error::{EngineError, EngineResult};
pub use crate::event::{EventType, TaskEvent};
pub use crate::sink::{DlqSink, EventSink, MemorySink, SinkMessage};
pub use crate::store::{MemoryStore, Page, TaskStore};
pub use crate::task::{Task, TaskBuilder, TaskId, TaskResult, TaskStatus};
pub use async_trait::async_trait;
