use super::context::TaskContext;
use super::{TaskError, TaskParams};
use crate::app_services::AppServices;
use crate::task_store::{QueuedTask, TaskStatus};

/// Result of one `handle` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work is done.
    Succeeded,
    /// The work failed; the reason is also in the task log.
    Failed(String),
    /// Some work may remain; the caller should schedule another run.
    Incomplete,
}

impl TaskOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskOutcome::Failed(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }

    /// Status the queue records for this outcome.
    pub fn final_status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Succeeded => TaskStatus::Succeeded,
            TaskOutcome::Failed(_) | TaskOutcome::Incomplete => TaskStatus::Failed,
        }
    }
}

/// A unit of work that can be run from the CLI or from the task queue.
///
/// Handlers are stateless: everything an execution needs comes in through the
/// [`TaskContext`], and a fresh instance is created for every run.
pub trait TaskHandler: Send + Sync {
    /// Stable identifier, unique within a registry.
    fn alias(&self) -> &'static str;

    fn title(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn handle(&self, ctx: &mut TaskContext) -> TaskOutcome;

    /// Submit a new queue entry for this handler.
    fn enqueue(&self, services: &AppServices, params: TaskParams) -> Result<QueuedTask, TaskError> {
        let store = services
            .task_store
            .as_ref()
            .ok_or(TaskError::NotConfigured)?;
        Ok(store.enqueue(self.alias(), &params)?)
    }

    /// Handles the `enqueue=yes` parameter for runs that are not backed by a queue entry.
    ///
    /// Returns true when the request was consumed (whether or not the enqueue worked),
    /// in which case the caller should stop and report success.
    fn enqueue_if_requested(&self, ctx: &mut TaskContext, params: TaskParams) -> bool {
        if ctx.has_queued_task() || ctx.param("enqueue") != "yes" {
            return false;
        }

        match self.enqueue(ctx.services(), params) {
            Ok(_) => ctx.log_success("Task enqueued."),
            Err(e) => ctx.log_error(format!("Error enqueuing task: {}", e)),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_and_failed_are_terminal_failures() {
        assert_eq!(TaskOutcome::Succeeded.final_status(), TaskStatus::Succeeded);
        assert_eq!(TaskOutcome::Incomplete.final_status(), TaskStatus::Failed);
        assert_eq!(
            TaskOutcome::failed("boom").final_status(),
            TaskStatus::Failed
        );
        assert!(TaskOutcome::Succeeded.is_success());
        assert!(!TaskOutcome::Incomplete.is_success());
    }
}
