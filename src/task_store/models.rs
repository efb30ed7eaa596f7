use crate::tasks::TaskParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued task.
///
/// Transitions are `Queued -> Running -> {Succeeded | Failed}`; a forced re-run
/// moves a non-running entry back to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskStatus::Queued),
            "running" => Some(TaskStatus::Running),
            "succeeded" => Some(TaskStatus::Succeeded),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted execution request for a task handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedTask {
    pub id: String,
    pub alias: String,
    pub params: TaskParams,
    pub status: TaskStatus,
    /// Append-only execution log, one line per entry.
    pub details: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueuedTask {
    pub fn detail_lines(&self) -> impl Iterator<Item = &str> {
        self.details.lines()
    }
}

/// Filter for listing and deleting queued tasks. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub alias: Option<String>,
    pub status: Option<TaskStatus>,
    pub created_before: Option<DateTime<Utc>>,
    /// Substring the details must contain.
    pub details_contains: Option<String>,
    pub limit: Option<usize>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    pub fn details_contains(mut self, text: impl Into<String>) -> Self {
        self.details_contains = Some(text.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
