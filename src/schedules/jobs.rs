use super::{JobContext, JobRunResult, ScheduleError, ScheduledJob};
use crate::config::ScheduleSettings;
use crate::task_store::{TaskQuery, TaskStatus, TaskStore};
use crate::tasks::handlers::{blind_index_rebuild, clean_up, stats_visitor_enhance};
use crate::tasks::{TaskParams, INCOMPLETE_MARKER};
use std::sync::Arc;
use std::time::Duration;

/// Enqueue `alias` unless an entry for it is already waiting.
pub struct EnqueueTaskJob {
    id: &'static str,
    description: &'static str,
    alias: &'static str,
    params: TaskParams,
    interval: Duration,
}

impl EnqueueTaskJob {
    pub fn new(
        id: &'static str,
        description: &'static str,
        alias: &'static str,
        params: TaskParams,
        interval: Duration,
    ) -> Self {
        Self {
            id,
            description,
            alias,
            params,
            interval,
        }
    }
}

impl ScheduledJob for EnqueueTaskJob {
    fn id(&self) -> &'static str {
        self.id
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self, ctx: &JobContext) -> Result<JobRunResult, ScheduleError> {
        let store = ctx
            .services
            .task_store
            .as_ref()
            .ok_or(ScheduleError::TaskStoreNotConfigured)?;

        if store.has_queued(self.alias)? {
            return Ok(JobRunResult::Skipped(format!(
                "{} is already queued",
                self.alias
            )));
        }

        let task = ctx.services.enqueue_task(self.alias, self.params.clone())?;
        Ok(JobRunResult::Done(format!(
            "Enqueued {} as {}",
            self.alias, task.id
        )))
    }
}

/// Delete finished entries of one alias so frequent tasks do not bloat the queue.
///
/// Succeeded entries go, and so do failed ones whose handler only stopped early.
/// Genuine failures are kept.
pub struct QueueClearJob {
    alias: &'static str,
    interval: Duration,
}

impl QueueClearJob {
    pub fn new(alias: &'static str, interval: Duration) -> Self {
        Self { alias, interval }
    }
}

impl ScheduledJob for QueueClearJob {
    fn id(&self) -> &'static str {
        "queue_clear"
    }

    fn description(&self) -> &'static str {
        "Deletes finished visitor enhance entries from the queue"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self, ctx: &JobContext) -> Result<JobRunResult, ScheduleError> {
        let store = ctx
            .services
            .task_store
            .as_ref()
            .ok_or(ScheduleError::TaskStoreNotConfigured)?;

        let succeeded = TaskQuery::new()
            .alias(self.alias)
            .status(TaskStatus::Succeeded);
        let incomplete = TaskQuery::new()
            .alias(self.alias)
            .status(TaskStatus::Failed)
            .details_contains(INCOMPLETE_MARKER);
        let deleted = store.delete_matching(&succeeded)? + store.delete_matching(&incomplete)?;
        if deleted == 0 {
            return Ok(JobRunResult::Skipped("No entries to clear".to_string()));
        }
        Ok(JobRunResult::Done(format!(
            "Cleared {} finished {} entries",
            deleted, self.alias
        )))
    }
}

/// The built-in schedule. A zero interval disables a job.
pub fn default_jobs(settings: &ScheduleSettings) -> Vec<Arc<dyn ScheduledJob>> {
    let secs = Duration::from_secs;
    let mut jobs: Vec<Arc<dyn ScheduledJob>> = Vec::new();

    if settings.stats_visitor_enhance_interval_secs > 0 {
        jobs.push(Arc::new(EnqueueTaskJob::new(
            "stats_visitor_enhance",
            "Enqueues the visitor stats enhancer",
            stats_visitor_enhance::ALIAS,
            TaskParams::new(),
            secs(settings.stats_visitor_enhance_interval_secs),
        )));
    }
    if settings.blind_index_rebuild_interval_secs > 0 {
        jobs.push(Arc::new(EnqueueTaskJob::new(
            "blind_index_rebuild",
            "Enqueues a rebuild of every blind index",
            blind_index_rebuild::ALIAS,
            TaskParams::new().with("index", "all"),
            secs(settings.blind_index_rebuild_interval_secs),
        )));
    }
    if settings.clean_up_interval_secs > 0 {
        jobs.push(Arc::new(EnqueueTaskJob::new(
            "clean_up",
            "Enqueues the task queue clean up",
            clean_up::ALIAS,
            TaskParams::new(),
            secs(settings.clean_up_interval_secs),
        )));
    }
    if settings.queue_clear_interval_secs > 0 {
        jobs.push(Arc::new(QueueClearJob::new(
            stats_visitor_enhance::ALIAS,
            secs(settings.queue_clear_interval_secs),
        )));
    }
    jobs
}
