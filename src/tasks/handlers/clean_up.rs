use crate::task_store::{TaskQuery, TaskStatus};
use crate::tasks::{TaskContext, TaskHandler, TaskOutcome, TaskParams, INCOMPLETE_MARKER};
use chrono::{Duration, Utc};

pub const ALIAS: &str = "CleanUpTask";

/// Succeeded or incomplete entries older than this are purged.
const PURGE_AFTER_MINUTES: i64 = 30;

pub struct CleanUpTask;

impl TaskHandler for CleanUpTask {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn title(&self) -> &'static str {
        "Clean Up"
    }

    fn description(&self) -> &'static str {
        "Clean up the database"
    }

    fn handle(&self, ctx: &mut TaskContext) -> TaskOutcome {
        let Some(task_store) = ctx.services().task_store.clone() else {
            ctx.log_info("TaskStore not configured; skipping CleanUpTask run.");
            return TaskOutcome::Succeeded;
        };

        if self.enqueue_if_requested(ctx, TaskParams::new()) {
            return TaskOutcome::Succeeded;
        }

        let purge_since = Utc::now() - Duration::minutes(PURGE_AFTER_MINUTES);
        let succeeded = TaskQuery::new()
            .status(TaskStatus::Succeeded)
            .created_before(purge_since);
        let incomplete = TaskQuery::new()
            .status(TaskStatus::Failed)
            .details_contains(INCOMPLETE_MARKER)
            .created_before(purge_since);

        let mut to_purge = Vec::new();
        for query in [&succeeded, &incomplete] {
            match task_store.list(query) {
                Ok(tasks) => to_purge.extend(tasks),
                Err(e) => {
                    ctx.log_error(format!("Error purging tasks: {}", e));
                    return TaskOutcome::failed(e.to_string());
                }
            }
        }

        ctx.log_info(format!(
            "Purging {} tasks older than {} ...",
            to_purge.len(),
            purge_since.format("%Y-%m-%d %H:%M:%S")
        ));

        for task in &to_purge {
            if let Err(e) = task_store.delete(&task.id) {
                ctx.log_error(format!("Error purging task: {}", e));
                return TaskOutcome::failed(e.to_string());
            }
        }

        TaskOutcome::Succeeded
    }
}
