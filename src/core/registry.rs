//! Handler registry: type-based dispatch for task execution.
//!
//! The registry maps task types to handlers. Registration replaces
//! atomically, so a lookup either sees the old handler or the new one,
//! never a torn state; executions already in flight keep the handler
//! snapshot they captured at lookup even if it is removed or replaced
//! mid-run.

use crate::error::{EngineError, EngineResult};
use crate::task::{Task, TaskResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Contract for task execution handlers.
///
/// A handler owns the business logic for exactly one task type. It reports
/// retryability by returning (or wrapping) one of the retryable error
/// classes; any other error routes the task to the dead-letter queue. A
/// handler may also return `Ok(TaskResult::Failure { .. })` directly to
/// settle without retries.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Executes the given task.
    async fn execute(&self, task: &Task) -> EngineResult<TaskResult>;

    /// The task type this handler processes.
    fn task_type(&self) -> &str;
}

/// Thread-safe registry of task handlers.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler under its task type.
    ///
    /// Replacing an existing registration is legal and logged; the old
    /// handler stays alive for executions that already looked it up.
    pub async fn register(&self, handler: Arc<dyn TaskHandler>) -> EngineResult<()> {
        let task_type = handler.task_type().to_string();
        if task_type.trim().is_empty() {
            return Err(EngineError::invalid("handler task type cannot be blank"));
        }

        let previous = self
            .handlers
            .write()
            .await
            .insert(task_type.clone(), handler);

        if previous.is_some() {
            tracing::warn!(task_type = %task_type, "overwriting existing handler");
        }
        tracing::info!(task_type = %task_type, "registered handler");
        Ok(())
    }

    /// Looks up the handler for a task type.
    pub async fn lookup(&self, task_type: &str) -> EngineResult<Option<Arc<dyn TaskHandler>>> {
        if task_type.trim().is_empty() {
            return Err(EngineError::invalid("task type cannot be blank"));
        }

        let handlers = self.handlers.read().await;
        let handler = handlers.get(task_type).cloned();
        if handler.is_none() {
            tracing::warn!(task_type = %task_type, "no handler found for task type");
        }
        Ok(handler)
    }

    /// Removes the handler for a task type, returning whether one existed.
    pub async fn remove(&self, task_type: &str) -> EngineResult<bool> {
        if task_type.trim().is_empty() {
            return Err(EngineError::invalid("task type cannot be blank"));
        }

        let removed = self.handlers.write().await.remove(task_type).is_some();
        if removed {
            tracing::info!(task_type = %task_type, "removed handler");
        }
        Ok(removed)
    }

    /// Whether a handler exists for the task type. Blank types simply
    /// return false.
    pub async fn has(&self, task_type: &str) -> bool {
        if task_type.trim().is_empty() {
            return false;
        }
        self.handlers.read().await.contains_key(task_type)
    }

    /// Number of registered handlers.
    pub async fn count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Removes every registration. Primarily for tests and shutdown.
    pub async fn clear(&self) {
        self.handlers.write().await.clear();
        tracing::info!("cleared all registered handlers");
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    struct StubHandler {
        task_type: String,
        marker: &'static str,
    }

    impl StubHandler {
        fn new(task_type: &str, marker: &'static str) -> Arc<Self> {
            Arc::new(Self {
                task_type: task_type.to_string(),
                marker,
            })
        }
    }

    #[async_trait]
    impl TaskHandler for StubHandler {
        async fn execute(&self, task: &Task) -> EngineResult<TaskResult> {
            let mut result = Map::new();
            result.insert("marker".to_string(), serde_json::json!(self.marker));
            Ok(TaskResult::Success {
                task_id: task.task_id.clone(),
                result,
            })
        }

        fn task_type(&self) -> &str {
            &self.task_type
        }
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry
            .register(StubHandler::new("EMAIL", "v1"))
            .await
            .unwrap();

        assert!(registry.has("EMAIL").await);
        assert_eq!(registry.count().await, 1);
        assert!(registry.lookup("EMAIL").await.unwrap().is_some());
        assert!(registry.lookup("EXPORT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_type_is_rejected() {
        let registry = HandlerRegistry::new();
        assert!(registry
            .register(StubHandler::new("   ", "v1"))
            .await
            .is_err());
        assert!(registry.lookup("  ").await.is_err());
        assert!(registry.remove("").await.is_err());
        assert!(!registry.has("").await);
    }

    #[tokio::test]
    async fn overwrite_replaces_but_keeps_in_flight_snapshot() {
        let registry = HandlerRegistry::new();
        registry
            .register(StubHandler::new("EMAIL", "v1"))
            .await
            .unwrap();

        let snapshot = registry.lookup("EMAIL").await.unwrap().unwrap();

        registry
            .register(StubHandler::new("EMAIL", "v2"))
            .await
            .unwrap();
        assert_eq!(registry.count().await, 1);

        // The pre-overwrite snapshot still runs the old handler.
        let task = crate::task::TaskBuilder::for_type("EMAIL").unwrap().build();
        let result = snapshot.execute(&task).await.unwrap();
        match result {
            TaskResult::Success { result, .. } => {
                assert_eq!(result["marker"], serde_json::json!("v1"))
            }
            other => panic!("expected success, got {other:?}"),
        }

        let current = registry.lookup("EMAIL").await.unwrap().unwrap();
        let result = current.execute(&task).await.unwrap();
        match result {
            TaskResult::Success { result, .. } => {
                assert_eq!(result["marker"], serde_json::json!("v2"))
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let registry = HandlerRegistry::new();
        registry
            .register(StubHandler::new("EMAIL", "v1"))
            .await
            .unwrap();
        registry
            .register(StubHandler::new("EXPORT", "v1"))
            .await
            .unwrap();

        assert!(registry.remove("EMAIL").await.unwrap());
        assert!(!registry.remove("EMAIL").await.unwrap());
        assert_eq!(registry.count().await, 1);

        registry.clear().await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_registration_is_safe() {
        let registry = Arc::new(HandlerRegistry::new());

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let task_type = format!("TYPE_{}", i % 4);
                registry
                    .register(StubHandler::new(&task_type, "v1"))
                    .await
                    .unwrap();
                registry.lookup(&task_type).await.unwrap()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(registry.count().await, 4);
    }
}
