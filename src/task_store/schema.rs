//! SQLite schema for the task queue database.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

/// Queued tasks. Timestamps are RFC3339 text, `params` is a JSON object.
const QUEUED_TASKS_TABLE_V1: Table = Table {
    name: "queued_tasks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("params", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "details",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text),
        sqlite_column!("completed_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_queued_tasks_status_created", "status, created_at"),
        ("idx_queued_tasks_alias_status", "alias, status"),
    ],
};

pub const TASK_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[QUEUED_TASKS_TABLE_V1],
    migration: None,
}];
