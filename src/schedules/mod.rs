//! Periodic jobs that feed the task queue and keep it tidy.

mod jobs;
mod scheduler;

pub use jobs::{default_jobs, EnqueueTaskJob, QueueClearJob};
pub use scheduler::Scheduler;

use crate::app_services::AppServices;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("task store is not configured")]
    TaskStoreNotConfigured,

    #[error(transparent)]
    Task(#[from] crate::tasks::TaskError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Shared resources handed to a job on every run.
#[derive(Clone)]
pub struct JobContext {
    pub cancellation_token: CancellationToken,
    pub services: Arc<AppServices>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, services: Arc<AppServices>) -> Self {
        Self {
            cancellation_token,
            services,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// A job run at a fixed interval.
///
/// `run` is called from a blocking context.
pub trait ScheduledJob: Send + Sync {
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn interval(&self) -> Duration;

    fn run(&self, ctx: &JobContext) -> Result<JobRunResult, ScheduleError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunResult {
    /// The job did its work; the message is logged.
    Done(String),
    /// Nothing to do this time.
    Skipped(String),
}
