//! Configuration types for the engine.
//!
//! [`EngineConfig`] is the single structure a host hands to
//! [`TaskEngine::new`](crate::core::TaskEngine::new). It covers the retry
//! policy, the two sink topics, and schema shaping for relational stores.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for handler attempts.
///
/// `max_retries` counts *additional* attempts beyond the first, so a policy
/// of 3 allows up to 4 invocations. Backoff grows exponentially from
/// `base_delay_ms`, doubling per attempt and clamped at `max_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,

    /// Clamp for any single backoff delay (in milliseconds)
    pub max_delay_ms: u64,

    /// Soft deadline for a single handler attempt (in milliseconds)
    pub attempt_timeout_ms: u64,

    /// Whether to randomize delays to avoid synchronized retries
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            attempt_timeout_ms: 5_000,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with the given retry cap.
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Fixed-delay retries: base and clamp collapse to the same value.
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            enable_jitter: false,
            ..Default::default()
        }
    }

    /// Disables retries completely; every failure is final on attempt one.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Base backoff delay as a `Duration`.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff clamp as a `Duration`.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Per-attempt deadline as a `Duration`.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Schema shaping for relational stores and migrations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Schema the tables live in
    pub schema_name: String,

    /// Prefix applied to every table name, useful when sharing a database
    /// with an existing application
    pub table_prefix: String,

    /// Name of the tasks table (without prefix)
    pub tasks_table_name: String,

    /// Name of the audit events table (without prefix)
    pub events_table_name: String,

    /// Whether to emit CHECK constraints on status and event type columns
    pub enable_constraints: bool,

    /// Whether to drop existing tables before creation. Use with caution.
    pub drop_existing_tables: bool,

    /// Create the schema on store construction
    pub auto_initialize: bool,

    /// Create and populate the audit events table
    pub enable_audit_events: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            schema_name: "public".to_string(),
            table_prefix: String::new(),
            tasks_table_name: "tasks".to_string(),
            events_table_name: "task_events".to_string(),
            enable_constraints: true,
            drop_existing_tables: false,
            auto_initialize: false,
            enable_audit_events: true,
        }
    }
}

impl SchemaOptions {
    /// Fully qualified tasks table name.
    pub fn tasks_table(&self) -> String {
        format!(
            "{}.{}{}",
            self.schema_name, self.table_prefix, self.tasks_table_name
        )
    }

    /// Fully qualified audit events table name.
    pub fn events_table(&self) -> String {
        format!(
            "{}.{}{}",
            self.schema_name, self.table_prefix, self.events_table_name
        )
    }
}

/// Main configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Retry policy applied to every execution
    pub retry: RetryPolicy,

    /// Topic lifecycle events are published to
    pub events_topic: String,

    /// Topic dead-lettered task payloads are sent to
    pub dlq_topic: String,

    /// Schema shaping for relational stores
    pub schema: SchemaOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            events_topic: "task-events".to_string(),
            dlq_topic: "task-dlq".to_string(),
            schema: SchemaOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Configuration tuned for tests: zero delays, no jitter, short attempt
    /// deadline.
    pub fn testing() -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: 3,
                base_delay_ms: 0,
                max_delay_ms: 0,
                attempt_timeout_ms: 1_000,
                enable_jitter: false,
            },
            events_topic: "task-events-test".to_string(),
            dlq_topic: "task-dlq-test".to_string(),
            schema: SchemaOptions::default(),
        }
    }

    /// Validates the configuration and returns any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.events_topic.trim().is_empty() {
            errors.push("events topic must not be blank".to_string());
        }
        if self.dlq_topic.trim().is_empty() {
            errors.push("dlq topic must not be blank".to_string());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            errors.push("retry max delay must be greater than or equal to base delay".to_string());
        }
        if self.retry.attempt_timeout_ms == 0 {
            errors.push("attempt timeout must be greater than 0".to_string());
        }
        if self.schema.tasks_table_name.trim().is_empty() {
            errors.push("tasks table name must not be blank".to_string());
        }
        if self.schema.enable_audit_events && self.schema.events_table_name.trim().is_empty() {
            errors.push("events table name must not be blank".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(60));
        assert_eq!(config.retry.attempt_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn testing_config_has_zero_delays() {
        let config = EngineConfig::testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.base_delay_ms, 0);
        assert!(!config.retry.enable_jitter);
    }

    #[test]
    fn blank_topics_fail_validation() {
        let mut config = EngineConfig::default();
        config.events_topic = "  ".to_string();
        config.dlq_topic = String::new();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("events topic")));
        assert!(errors.iter().any(|e| e.contains("dlq topic")));
    }

    #[test]
    fn inverted_delays_fail_validation() {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("max delay")));
    }

    #[test]
    fn retry_policy_presets() {
        let exp = RetryPolicy::exponential(5);
        assert_eq!(exp.max_retries, 5);
        assert!(exp.enable_jitter);

        let fixed = RetryPolicy::fixed(2, 250);
        assert_eq!(fixed.base_delay_ms, 250);
        assert_eq!(fixed.max_delay_ms, 250);
        assert!(!fixed.enable_jitter);

        let none = RetryPolicy::none();
        assert_eq!(none.max_retries, 0);
    }

    #[test]
    fn schema_options_qualify_table_names() {
        let mut schema = SchemaOptions::default();
        schema.schema_name = "billing".to_string();
        schema.table_prefix = "edi_".to_string();

        assert_eq!(schema.tasks_table(), "billing.edi_tasks");
        assert_eq!(schema.events_table(), "billing.edi_task_events");
    }
}
