//! Relational schema rendering.
//!
//! Renders the DDL for the tasks and audit-event tables from
//! [`SchemaOptions`], substituting schema name, prefix and table names so
//! the engine can share a database with an existing application. The
//! `postgres-store` feature applies these statements when
//! `auto_initialize` is set.

use crate::config::SchemaOptions;

const TASK_STATUSES: &str = "'PENDING', 'IN_PROGRESS', 'COMPLETED', 'FAILED', 'DEAD_LETTER'";
const EVENT_TYPES: &str = "'TASK_CREATED', 'TASK_STARTED', 'TASK_COMPLETED', 'TASK_FAILED', \
     'RETRY_ATTEMPTED', 'MOVED_TO_DLQ', 'RECOVERED_FROM_DLQ'";

/// Renders the full DDL as an ordered list of statements.
pub fn render(options: &SchemaOptions) -> Vec<String> {
    let tasks = options.tasks_table();
    let events = options.events_table();
    let prefix = format!("{}{}", options.table_prefix, options.tasks_table_name);
    let events_prefix = format!("{}{}", options.table_prefix, options.events_table_name);

    let mut statements = Vec::new();

    if options.drop_existing_tables {
        if options.enable_audit_events {
            statements.push(format!("DROP TABLE IF EXISTS {events}"));
        }
        statements.push(format!("DROP TABLE IF EXISTS {tasks}"));
    }

    let status_check = if options.enable_constraints {
        format!(" CHECK (status IN ({TASK_STATUSES}))")
    } else {
        String::new()
    };

    statements.push(format!(
        "CREATE TABLE IF NOT EXISTS {tasks} (\n\
         \x20   task_id VARCHAR(36) PRIMARY KEY,\n\
         \x20   type VARCHAR(100) NOT NULL,\n\
         \x20   status VARCHAR(20) NOT NULL{status_check},\n\
         \x20   data JSONB,\n\
         \x20   handler_url VARCHAR(255) NULL,\n\
         \x20   retry_count INT DEFAULT 0,\n\
         \x20   created_at TIMESTAMPTZ NOT NULL,\n\
         \x20   updated_at TIMESTAMPTZ NOT NULL\n\
         )"
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS idx_{prefix}_status ON {tasks} (status)"
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS idx_{prefix}_type_status ON {tasks} (type, status)"
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS idx_{prefix}_updated_at ON {tasks} (updated_at)"
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS idx_{prefix}_status_updated_at ON {tasks} (status, updated_at)"
    ));

    if options.enable_audit_events {
        let event_check = if options.enable_constraints {
            format!(" CHECK (event_type IN ({EVENT_TYPES}))")
        } else {
            String::new()
        };

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {events} (\n\
             \x20   event_id VARCHAR(36) PRIMARY KEY,\n\
             \x20   task_id VARCHAR(36) NOT NULL REFERENCES {tasks} (task_id) ON DELETE CASCADE,\n\
             \x20   event_type VARCHAR(50) NOT NULL{event_check},\n\
             \x20   metadata JSONB,\n\
             \x20   created_at TIMESTAMPTZ NOT NULL\n\
             )"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{events_prefix}_task_id ON {events} (task_id)"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{events_prefix}_created_at ON {events} (created_at)"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{events_prefix}_event_type ON {events} (event_type)"
        ));
    }

    statements
}
