mod models;
mod schema;
mod sqlite_task_store;

pub use models::*;
pub use schema::TASK_STORE_VERSIONED_SCHEMAS;
pub use sqlite_task_store::SqliteTaskStore;

use crate::tasks::TaskParams;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Persistence for the task queue.
///
/// State transitions are conditional updates on `status`, so concurrent workers
/// (in this process or another one sharing the database) never both own an entry.
pub trait TaskStore: Send + Sync {
    /// Persist a new entry in `Queued` state.
    fn enqueue(&self, alias: &str, params: &TaskParams) -> Result<QueuedTask>;

    fn find_by_id(&self, id: &str) -> Result<Option<QueuedTask>>;

    /// Entries matching `query`, oldest first.
    fn list(&self, query: &TaskQuery) -> Result<Vec<QueuedTask>>;

    fn has_queued(&self, alias: &str) -> Result<bool>;

    /// Atomically move a `Queued` entry to `Running`.
    /// Returns false if the entry is missing or was not queued.
    fn claim(&self, id: &str) -> Result<bool>;

    /// Claim the oldest queued entry, if any.
    fn claim_next(&self) -> Result<Option<QueuedTask>>;

    /// Append one line to the entry's details.
    fn append_details(&self, id: &str, line: &str) -> Result<()>;

    /// Move a `Running` entry to a terminal status, appending `line` (if any) in
    /// the same statement. Returns false if the entry was not running.
    fn finish(&self, id: &str, status: TaskStatus, line: Option<&str>) -> Result<bool>;

    /// Reset a non-running entry back to `Queued` for a forced re-run.
    /// Returns false if the entry is missing or currently running.
    fn requeue(&self, id: &str) -> Result<bool>;

    fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every entry matching `query`. Returns the number of deleted rows.
    fn delete_matching(&self, query: &TaskQuery) -> Result<usize>;

    /// Mark entries running since before `started_before` as failed, except
    /// those whose id is in `keep`.
    fn fail_stale_running(&self, started_before: DateTime<Utc>, keep: &[String]) -> Result<usize>;
}
