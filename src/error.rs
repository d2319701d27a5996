//! Error types for engine operations.

use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Main error type for engine operations.
///
/// Retryability is a property of the whole error chain, not just the top
/// variant: a `Handler` error wrapping a `Retryable` source is retryable.
/// See [`EngineError::is_retryable`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// Caller supplied null, blank or inconsistent inputs
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Task id absent from the store
    #[error("task not found: {task_id}")]
    NotFound {
        /// The missing task id
        task_id: String,
    },

    /// No handler registered for a task type
    #[error("no handler registered for task type '{task_type}'")]
    HandlerNotFound {
        /// The task type that wasn't found
        task_type: String,
    },

    /// Marker for failures the handler declares safe to retry
    #[error("retryable failure: {message}")]
    Retryable {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single attempt exceeded its deadline
    #[error("attempt timed out after {timeout:?}")]
    Timeout {
        /// The enforced deadline
        timeout: Duration,
    },

    /// Transient persistence failure, safe to retry
    #[error("transient store failure: {message}")]
    TransientStore {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Terminal handler failure, routes to the DLQ
    #[error("handler failure: {message}")]
    Handler {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persistence failure that is not known to be transient
    #[error("store failure: {message}")]
    Store {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Event or DLQ publish failure; logged and swallowed by the engine
    #[error("sink failure: {message}")]
    Sink {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl EngineError {
    /// Create an invalid-argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a retryable marker error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a retryable marker error wrapping a cause
    pub fn retryable_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Retryable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a terminal handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            source: None,
        }
    }

    /// Create a terminal handler error wrapping a cause
    pub fn handler_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error wrapping a cause
    pub fn store_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transient store error
    pub fn transient_store(message: impl Into<String>) -> Self {
        Self::TransientStore {
            message: message.into(),
            source: None,
        }
    }

    /// Create a sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            source: None,
        }
    }

    /// Create a sink error wrapping a cause
    pub fn sink_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sink {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns a short stable label for logs, metrics and DLQ metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::NotFound { .. } => "not_found",
            EngineError::HandlerNotFound { .. } => "handler_not_found",
            EngineError::Retryable { .. } => "retryable",
            EngineError::Timeout { .. } => "timeout",
            EngineError::TransientStore { .. } => "transient_store",
            EngineError::Handler { .. } => "handler",
            EngineError::Store { .. } => "store",
            EngineError::Sink { .. } => "sink",
            EngineError::Serialization(_) => "serialization",
            EngineError::Config { .. } => "config",
        }
    }

    /// Walks the error and its transitive causes looking for a retryable
    /// class: `Retryable`, `Timeout`, `TransientStore`, or a nested
    /// `tokio::time::error::Elapsed`. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(engine) = err.downcast_ref::<EngineError>() {
                if matches!(
                    engine,
                    EngineError::Retryable { .. }
                        | EngineError::Timeout { .. }
                        | EngineError::TransientStore { .. }
                ) {
                    return true;
                }
            }
            if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// Renders the error chain, one cause per line.
    ///
    /// Used as the structured substitute for a stack trace in DLQ metadata:
    /// the top error first, each transitive cause on its own line prefixed
    /// with `caused by:`.
    pub fn chain_description(&self) -> String {
        let mut out = self.to_string();
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self);
        while let Some(err) = current {
            out.push_str("\ncaused by: ");
            out.push_str(&err.to_string());
            current = err.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_classes_are_retryable() {
        assert!(EngineError::retryable("later").is_retryable());
        assert!(EngineError::Timeout {
            timeout: Duration::from_secs(5)
        }
        .is_retryable());
        assert!(EngineError::transient_store("pool exhausted").is_retryable());
    }

    #[test]
    fn terminal_classes_are_not_retryable() {
        assert!(!EngineError::handler("bad payload").is_retryable());
        assert!(!EngineError::invalid("blank id").is_retryable());
        assert!(!EngineError::store("constraint violated").is_retryable());
        assert!(!EngineError::sink("broker down").is_retryable());
    }

    #[test]
    fn retryability_is_found_through_the_cause_chain() {
        let wrapped = EngineError::handler_with(
            "downstream call failed",
            EngineError::retryable("connection reset"),
        );
        assert!(wrapped.is_retryable());

        let twice = EngineError::handler_with("outer", wrapped);
        assert!(twice.is_retryable());

        let terminal = EngineError::handler_with("outer", EngineError::handler("inner"));
        assert!(!terminal.is_retryable());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(EngineError::retryable("x").kind(), "retryable");
        assert_eq!(EngineError::handler("x").kind(), "handler");
        assert_eq!(
            EngineError::NotFound {
                task_id: "t".into()
            }
            .kind(),
            "not_found"
        );
    }

    #[test]
    fn chain_description_renders_all_causes() {
        let err = EngineError::handler_with(
            "step failed",
            EngineError::retryable_with("io stalled", EngineError::transient_store("pool")),
        );

        let chain = err.chain_description();
        let lines: Vec<&str> = chain.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("step failed"));
        assert!(lines[1].starts_with("caused by: "));
        assert!(lines[1].contains("io stalled"));
        assert!(lines[2].contains("pool"));
    }
}
