use super::models::{QueuedTask, TaskQuery, TaskStatus};
use super::schema::TASK_STORE_VERSIONED_SCHEMAS;
use super::TaskStore;
use crate::sqlite_persistence::open_versioned_db;
use crate::tasks::TaskParams;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const STALE_RUNNING_LINE: &str = "Task exceeded the running time limit and was marked as failed";

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), "task", TASK_STORE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fixed-width RFC3339 so that text comparison matches time order.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn row_to_queued_task(row: &rusqlite::Row) -> rusqlite::Result<QueuedTask> {
        let status_str: String = row.get("status")?;
        let params_str: String = row.get("params")?;
        let created_at_str: String = row.get("created_at")?;
        let started_at_str: Option<String> = row.get("started_at")?;
        let completed_at_str: Option<String> = row.get("completed_at")?;

        Ok(QueuedTask {
            id: row.get("id")?,
            alias: row.get("alias")?,
            params: TaskParams::from_json(&params_str).unwrap_or_default(),
            status: TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Failed),
            details: row.get("details")?,
            attempts: row.get("attempts")?,
            created_at: Self::parse_datetime(&created_at_str).unwrap_or_else(Utc::now),
            started_at: started_at_str.as_deref().and_then(Self::parse_datetime),
            completed_at: completed_at_str.as_deref().and_then(Self::parse_datetime),
        })
    }

    fn find_with_conn(conn: &Connection, id: &str) -> Result<Option<QueuedTask>> {
        let task = conn
            .query_row(
                "SELECT * FROM queued_tasks WHERE id = ?1",
                params![id],
                Self::row_to_queued_task,
            )
            .optional()?;
        Ok(task)
    }

    fn claim_with_conn(conn: &Connection, id: &str) -> Result<bool> {
        let updated = conn.execute(
            "UPDATE queued_tasks
             SET status = ?1, started_at = ?2, completed_at = NULL, attempts = attempts + 1
             WHERE id = ?3 AND status = ?4",
            params![
                TaskStatus::Running.as_str(),
                Self::format_datetime(&Utc::now()),
                id,
                TaskStatus::Queued.as_str()
            ],
        )?;
        Ok(updated == 1)
    }

    fn where_clause(query: &TaskQuery) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(alias) = &query.alias {
            values.push(alias.clone());
            clauses.push(format!("alias = ?{}", values.len()));
        }
        if let Some(status) = query.status {
            values.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(before) = &query.created_before {
            values.push(Self::format_datetime(before));
            clauses.push(format!("created_at < ?{}", values.len()));
        }
        if let Some(text) = &query.details_contains {
            values.push(text.clone());
            clauses.push(format!("instr(details, ?{}) > 0", values.len()));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }

    fn with_newline(line: &str) -> String {
        let mut line = line.trim_end_matches('\n').to_string();
        line.push('\n');
        line
    }
}

impl TaskStore for SqliteTaskStore {
    fn enqueue(&self, alias: &str, params: &TaskParams) -> Result<QueuedTask> {
        let task = QueuedTask {
            id: uuid::Uuid::new_v4().to_string(),
            alias: alias.to_string(),
            params: params.clone(),
            status: TaskStatus::Queued,
            details: String::new(),
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let payload = params.to_json().context("Failed to encode task params")?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO queued_tasks (id, alias, params, status, details, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, '', 0, ?5)",
            params![
                task.id,
                task.alias,
                payload,
                task.status.as_str(),
                Self::format_datetime(&task.created_at)
            ],
        )
        .with_context(|| format!("Failed to enqueue task {}", alias))?;
        Ok(task)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<QueuedTask>> {
        let conn = self.conn.lock().unwrap();
        Self::find_with_conn(&conn, id)
    }

    fn list(&self, query: &TaskQuery) -> Result<Vec<QueuedTask>> {
        let (where_sql, values) = Self::where_clause(query);
        let mut sql = format!(
            "SELECT * FROM queued_tasks{} ORDER BY created_at ASC, rowid ASC",
            where_sql
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_queued_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn has_queued(&self, alias: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM queued_tasks WHERE alias = ?1 AND status = ?2 LIMIT 1",
                params![alias, TaskStatus::Queued.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn claim(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Self::claim_with_conn(&conn, id)
    }

    fn claim_next(&self) -> Result<Option<QueuedTask>> {
        let conn = self.conn.lock().unwrap();
        let candidate: Option<String> = conn
            .query_row(
                "SELECT id FROM queued_tasks WHERE status = ?1
                 ORDER BY created_at ASC, rowid ASC LIMIT 1",
                params![TaskStatus::Queued.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            return Ok(None);
        };
        // Another process sharing the database may have won the race; the
        // caller simply polls again.
        if !Self::claim_with_conn(&conn, &id)? {
            return Ok(None);
        }
        Self::find_with_conn(&conn, &id)
    }

    fn append_details(&self, id: &str, line: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE queued_tasks SET details = details || ?1 WHERE id = ?2",
            params![Self::with_newline(line), id],
        )?;
        if updated == 0 {
            bail!("Queued task not found: {}", id);
        }
        Ok(())
    }

    fn finish(&self, id: &str, status: TaskStatus, line: Option<&str>) -> Result<bool> {
        if !status.is_terminal() {
            bail!("Cannot finish task {} with non-terminal status {}", id, status);
        }
        let suffix = line.map(Self::with_newline).unwrap_or_default();
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE queued_tasks
             SET status = ?1, completed_at = ?2, details = details || ?3
             WHERE id = ?4 AND status = ?5",
            params![
                status.as_str(),
                Self::format_datetime(&Utc::now()),
                suffix,
                id,
                TaskStatus::Running.as_str()
            ],
        )?;
        Ok(updated == 1)
    }

    fn requeue(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE queued_tasks
             SET status = ?1, started_at = NULL, completed_at = NULL, details = details || ?2
             WHERE id = ?3 AND status != ?4",
            params![
                TaskStatus::Queued.as_str(),
                Self::with_newline("Task re-queued for a forced run"),
                id,
                TaskStatus::Running.as_str()
            ],
        )?;
        Ok(updated == 1)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM queued_tasks WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }

    fn delete_matching(&self, query: &TaskQuery) -> Result<usize> {
        let (where_sql, values) = Self::where_clause(query);
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            &format!("DELETE FROM queued_tasks{}", where_sql),
            params_from_iter(values.iter()),
        )?;
        Ok(deleted)
    }

    fn fail_stale_running(&self, started_before: DateTime<Utc>, keep: &[String]) -> Result<usize> {
        let mut values = vec![
            TaskStatus::Failed.as_str().to_string(),
            Self::format_datetime(&Utc::now()),
            Self::with_newline(STALE_RUNNING_LINE),
            TaskStatus::Running.as_str().to_string(),
            Self::format_datetime(&started_before),
        ];
        let mut sql = String::from(
            "UPDATE queued_tasks
             SET status = ?1, completed_at = ?2, details = details || ?3
             WHERE status = ?4 AND started_at < ?5",
        );
        if !keep.is_empty() {
            let placeholders: Vec<String> = (0..keep.len())
                .map(|i| format!("?{}", values.len() + i + 1))
                .collect();
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders.join(", ")));
            values.extend(keep.iter().cloned());
        }

        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(updated)
    }
}
