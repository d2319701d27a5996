//! PostgreSQL task store.
//!
//! Persists tasks in the relational schema rendered by [`crate::schema`],
//! with the payload in a JSON column decoded lazily at the domain boundary.
//! With `enable_audit_events` the store also acts as an [`EventSink`],
//! appending lifecycle events to the audit table.

use super::{Page, TaskStore};
use crate::config::SchemaOptions;
use crate::error::{EngineError, EngineResult};
use crate::schema;
use crate::sink::EventSink;
use crate::task::{Task, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

/// Relational [`TaskStore`] backed by a shared `sqlx` pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    options: SchemaOptions,
    tasks_table: String,
    events_table: String,
}

impl PostgresStore {
    /// Wraps an existing pool; applies the schema when
    /// `options.auto_initialize` is set.
    pub async fn new(pool: PgPool, options: SchemaOptions) -> EngineResult<Self> {
        let store = Self {
            pool,
            tasks_table: options.tasks_table(),
            events_table: options.events_table(),
            options,
        };

        if store.options.auto_initialize {
            store.initialize().await?;
        }
        Ok(store)
    }

    /// Connects a fresh pool for the given connection string.
    pub async fn connect(connection_string: &str, options: SchemaOptions) -> EngineResult<Self> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!("connected PostgreSQL task store");
        Self::new(pool, options).await
    }

    /// Applies the rendered schema statements.
    pub async fn initialize(&self) -> EngineResult<()> {
        for statement in schema::render(&self.options) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        tracing::info!(
            tasks_table = %self.tasks_table,
            audit_events = self.options.enable_audit_events,
            "task schema initialized"
        );
        Ok(())
    }

    fn row_to_task(row: &PgRow) -> EngineResult<Task> {
        let status: String = row.try_get("status").map_err(map_sqlx_error)?;
        let data: Option<Value> = row.try_get("data").map_err(map_sqlx_error)?;
        let data = match data {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(EngineError::store(format!(
                    "task data column holds non-object JSON: {other}"
                )))
            }
            None => serde_json::Map::new(),
        };
        let retry_count: i32 = row.try_get("retry_count").map_err(map_sqlx_error)?;

        Ok(Task {
            task_id: row.try_get("task_id").map_err(map_sqlx_error)?,
            task_type: row.try_get("type").map_err(map_sqlx_error)?,
            data,
            status: status.parse()?,
            retry_count: retry_count.max(0) as u32,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
        })
    }

    async fn fetch_tasks(
        &self,
        where_clause: &str,
        binds: Vec<String>,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>> {
        let mut sql = format!(
            "SELECT task_id, type, status, data, retry_count, created_at, updated_at \
             FROM {} WHERE {} ORDER BY updated_at DESC",
            self.tasks_table, where_clause
        );
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(Self::row_to_task).collect()
    }
}

/// Pool exhaustion and I/O problems are transient and safe to retry;
/// anything else surfaces as a plain store failure.
fn map_sqlx_error(e: sqlx::Error) -> EngineError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            EngineError::TransientStore {
                message: e.to_string(),
                source: Some(Box::new(e)),
            }
        }
        _ => EngineError::Store {
            message: e.to_string(),
            source: Some(Box::new(e)),
        },
    }
}

#[async_trait]
impl TaskStore for PostgresStore {
    async fn save(&self, task: &Task) -> EngineResult<Task> {
        let sql = format!(
            "INSERT INTO {} (task_id, type, status, data, retry_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (task_id) DO UPDATE SET \
             status = EXCLUDED.status, data = EXCLUDED.data, \
             retry_count = EXCLUDED.retry_count, updated_at = EXCLUDED.updated_at",
            self.tasks_table
        );

        sqlx::query(&sql)
            .bind(&task.task_id)
            .bind(&task.task_type)
            .bind(task.status.to_string())
            .bind(Value::Object(task.data.clone()))
            .bind(task.retry_count as i32)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        tracing::debug!(task_id = %task.task_id, status = %task.status, "saved task");
        Ok(task.clone())
    }

    async fn find_by_id(&self, task_id: &str) -> EngineResult<Option<Task>> {
        let sql = format!(
            "SELECT task_id, type, status, data, retry_count, created_at, updated_at \
             FROM {} WHERE task_id = $1",
            self.tasks_table
        );

        let row = sqlx::query(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_by_status(
        &self,
        status: TaskStatus,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>> {
        self.fetch_tasks("status = $1", vec![status.to_string()], page)
            .await
    }

    async fn find_by_type(&self, task_type: &str, page: Option<Page>) -> EngineResult<Vec<Task>> {
        self.fetch_tasks("type = $1", vec![task_type.to_string()], page)
            .await
    }

    async fn find_by_type_and_status(
        &self,
        task_type: &str,
        status: TaskStatus,
        page: Option<Page>,
    ) -> EngineResult<Vec<Task>> {
        self.fetch_tasks(
            "type = $1 AND status = $2",
            vec![task_type.to_string(), status.to_string()],
            page,
        )
        .await
    }

    async fn count_by_status(&self) -> EngineResult<HashMap<TaskStatus, u64>> {
        let sql = format!(
            "SELECT status, COUNT(*) AS total FROM {} GROUP BY status",
            self.tasks_table
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut counts = HashMap::new();
        for row in &rows {
            let status: String = row.try_get("status").map_err(map_sqlx_error)?;
            let total: i64 = row.try_get("total").map_err(map_sqlx_error)?;
            counts.insert(status.parse::<TaskStatus>()?, total.max(0) as u64);
        }
        Ok(counts)
    }

    async fn find_failed_for_retry(&self, max_retries: u32) -> EngineResult<Vec<Task>> {
        let sql = format!(
            "SELECT task_id, type, status, data, retry_count, created_at, updated_at \
             FROM {} WHERE status = 'FAILED' AND retry_count < $1 \
             ORDER BY updated_at DESC",
            self.tasks_table
        );

        let rows = sqlx::query(&sql)
            .bind(max_retries as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn find_stuck(&self, threshold: DateTime<Utc>) -> EngineResult<Vec<Task>> {
        let sql = format!(
            "SELECT task_id, type, status, data, retry_count, created_at, updated_at \
             FROM {} WHERE status = 'IN_PROGRESS' AND updated_at < $1 \
             ORDER BY updated_at DESC",
            self.tasks_table
        );

        let rows = sqlx::query(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> EngineResult<u64> {
        let sql = format!(
            "UPDATE {} SET status = $1, updated_at = NOW() WHERE task_id = $2",
            self.tasks_table
        );

        let result = sqlx::query(&sql)
            .bind(status.to_string())
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn increment_retry(&self, task_id: &str) -> EngineResult<u64> {
        let sql = format!(
            "UPDATE {} SET retry_count = retry_count + 1, updated_at = NOW() WHERE task_id = $1",
            self.tasks_table
        );

        let result = sqlx::query(&sql)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_completed_older_than(&self, threshold: DateTime<Utc>) -> EngineResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE status = 'COMPLETED' AND updated_at < $1",
            self.tasks_table
        );

        let result = sqlx::query(&sql)
            .bind(threshold)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

/// Audit-event sink: each published event becomes a row in the events
/// table. A no-op when `enable_audit_events` is off.
#[async_trait]
impl EventSink for PostgresStore {
    async fn send(&self, _topic: &str, key: &str, payload: Value) -> EngineResult<()> {
        if !self.options.enable_audit_events {
            return Ok(());
        }

        let event_type = payload
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        let metadata = payload.get("metadata").cloned().unwrap_or(Value::Null);

        let sql = format!(
            "INSERT INTO {} (event_id, task_id, event_type, metadata, created_at) \
             VALUES ($1, $2, $3, $4, NOW())",
            self.events_table
        );

        sqlx::query(&sql)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(key)
            .bind(event_type)
            .bind(metadata)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::sink_with("failed to append audit event", e))?;
        Ok(())
    }
}
