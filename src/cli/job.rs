//! `job --task_id=<id> [--force=yes]`: run one queued entry in the foreground.

use crate::app_services::AppServices;
use crate::task_store::TaskStatus;
use crate::tasks::{ProcessOutcome, TaskParams, TaskQueueOptions, TaskQueueRunner};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What `job` did, rendered as the line printed to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunReport {
    MissingTaskId,
    TaskStoreNotConfigured,
    NotFound(String),
    CurrentlyRunning(String),
    NotQueued(String),
    ProcessingFailed { id: String, error: String },
    Finished { id: String, status: TaskStatus },
}

impl JobRunReport {
    /// True only when the entry ran and succeeded.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobRunReport::Finished {
                status: TaskStatus::Succeeded,
                ..
            }
        )
    }
}

impl fmt::Display for JobRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobRunReport::MissingTaskId => {
                write!(f, "Task ID is required and must be the first argument")
            }
            JobRunReport::TaskStoreNotConfigured => write!(f, "Task store is not configured"),
            JobRunReport::NotFound(id) => write!(f, "Task not found: {}", id),
            JobRunReport::CurrentlyRunning(id) => {
                write!(f, "Task is currently running: {} Aborted", id)
            }
            JobRunReport::NotQueued(id) => write!(
                f,
                "Task is not queued: {} . You can use the --force=yes option to force the execution of the job. Aborted",
                id
            ),
            JobRunReport::ProcessingFailed { id, error } => {
                write!(f, "Error processing task: {} {}", id, error)
            }
            JobRunReport::Finished { id, status } => {
                if *status == TaskStatus::Succeeded {
                    write!(f, "Job: {} run OK", id)
                } else {
                    write!(f, "Job: {} run failed", id)
                }
            }
        }
    }
}

/// Process the entry named by `--task_id`, logging the report line.
pub fn run_job(services: &Arc<AppServices>, args: &[String]) -> JobRunReport {
    let params = TaskParams::from_cli_args(args);
    info!("Executing job with arguments: {:?}", params);

    let report = process(services, &params);
    match &report {
        JobRunReport::Finished { .. } if report.is_success() => info!("{}", report),
        JobRunReport::ProcessingFailed { .. } => error!("{}", report),
        _ => warn!("{}", report),
    }
    report
}

fn process(services: &Arc<AppServices>, params: &TaskParams) -> JobRunReport {
    let id = params.get("task_id");
    if id.is_empty() {
        return JobRunReport::MissingTaskId;
    }
    if services.task_store.is_none() {
        return JobRunReport::TaskStoreNotConfigured;
    }
    let force = params.get("force") == "yes";

    let runner = TaskQueueRunner::new(services.clone(), TaskQueueOptions::default());
    match runner.process_one(id, force) {
        Ok(ProcessOutcome::NotFound) => JobRunReport::NotFound(id.to_string()),
        Ok(ProcessOutcome::CurrentlyRunning) => JobRunReport::CurrentlyRunning(id.to_string()),
        Ok(ProcessOutcome::NotQueued) => JobRunReport::NotQueued(id.to_string()),
        Ok(ProcessOutcome::Executed(status)) => JobRunReport::Finished {
            id: id.to_string(),
            status,
        },
        Err(e) => JobRunReport::ProcessingFailed {
            id: id.to_string(),
            error: e.to_string(),
        },
    }
}
