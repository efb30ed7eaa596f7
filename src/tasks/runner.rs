use super::context::{format_log_line, LogLevel, TaskContext};
use super::{TaskError, TaskOutcome};
use crate::app_services::AppServices;
use crate::server::metrics;
use crate::task_store::{QueuedTask, TaskStatus, TaskStore};
use anyhow::Result;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const UNKNOWN_ALIAS_LINE: &str = "unknown alias";

/// Appended to the details of entries whose handler returned
/// [`TaskOutcome::Incomplete`]; purge jobs use it to tell them from real failures.
pub const INCOMPLETE_MARKER: &str = "Task did not complete; marked as failed";

#[derive(Debug, Clone)]
pub struct TaskQueueOptions {
    /// Upper bound of entries running at the same time in this process.
    pub max_concurrent: usize,
    /// Idle wait between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Running entries older than this are marked as failed.
    pub unstuck_after: Duration,
}

impl Default for TaskQueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            poll_interval: Duration::from_secs(2),
            unstuck_after: Duration::from_secs(2 * 60),
        }
    }
}

/// What happened to a single entry processed on request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    NotFound,
    CurrentlyRunning,
    NotQueued,
    Executed(TaskStatus),
}

/// Claims queued entries and runs their handlers.
///
/// The concurrency cap is the size of the worker pool: each worker owns at most
/// one entry at a time. Mutual exclusion between workers comes from the store's
/// conditional claim.
pub struct TaskQueueRunner {
    services: Arc<AppServices>,
    options: TaskQueueOptions,
    /// Ids whose handler is executing in this process right now.
    in_flight: Mutex<HashSet<String>>,
}

/// Keeps an id in the in-flight set for as long as it lives.
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn enter(ids: &'a Mutex<HashSet<String>>, id: &str) -> Self {
        ids.lock().unwrap().insert(id.to_string());
        Self {
            ids,
            id: id.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids.lock().unwrap().remove(&self.id);
    }
}

impl TaskQueueRunner {
    pub fn new(services: Arc<AppServices>, options: TaskQueueOptions) -> Self {
        Self {
            services,
            options,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn options(&self) -> &TaskQueueOptions {
        &self.options
    }

    fn store(&self) -> Result<Arc<dyn TaskStore>, TaskError> {
        self.services
            .task_store
            .clone()
            .ok_or(TaskError::NotConfigured)
    }

    /// Run the worker pool and the unstuck loop until `shutdown` is cancelled.
    pub async fn run_workers(self: Arc<Self>, shutdown: CancellationToken) {
        if self.services.task_store.is_none() {
            warn!("Task store not configured; task queue workers not started");
            return;
        }

        let workers = self.options.max_concurrent.max(1);
        info!(
            "Starting task queue with {} workers (poll interval {}s)",
            workers,
            self.options.poll_interval.as_secs()
        );

        let mut handles = Vec::with_capacity(workers + 1);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(
                self.clone().worker_loop(worker_id, shutdown.clone()),
            ));
        }
        handles.push(tokio::spawn(self.clone().unstuck_loop(shutdown.clone())));

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Task queue loop terminated abnormally: {}", e);
            }
        }
        info!("Task queue stopped");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, shutdown: CancellationToken) {
        debug!("Task worker {} started", worker_id);
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let runner = self.clone();
            let worked = match tokio::task::spawn_blocking(move || runner.run_next()).await {
                Ok(Ok(worked)) => worked,
                Ok(Err(e)) => {
                    error!("Task worker {} failed to claim an entry: {}", worker_id, e);
                    false
                }
                Err(e) => {
                    error!("Task worker {} crashed: {}", worker_id, e);
                    false
                }
            };
            if worked {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("Task worker {} stopped", worker_id);
    }

    async fn unstuck_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let interval = self.options.unstuck_after.max(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => break,
            }

            let runner = self.clone();
            match tokio::task::spawn_blocking(move || runner.unstuck()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(count)) => info!("Marked {} stuck tasks as failed", count),
                Ok(Err(e)) => error!("Failed to unstuck tasks: {}", e),
                Err(e) => error!("Unstuck loop crashed: {}", e),
            }
        }
    }

    /// Claim the oldest queued entry and execute it. Returns false when the queue was empty.
    pub fn run_next(&self) -> Result<bool> {
        let store = self.store()?;
        match store.claim_next()? {
            Some(task) => {
                metrics::record_task_claim();
                self.execute(store.as_ref(), task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fail entries that have been running longer than `unstuck_after`.
    ///
    /// Entries still executing in this process are left alone; only those
    /// abandoned by a dead worker or process are failed.
    pub fn unstuck(&self) -> Result<usize> {
        let store = self.store()?;
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.options.unstuck_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(2));
        let keep: Vec<String> = self.in_flight.lock().unwrap().iter().cloned().collect();
        let count = store.fail_stale_running(cutoff, &keep)?;
        metrics::record_tasks_unstuck(count);
        Ok(count)
    }

    /// Process one entry by id, re-queuing it first when `force` is set.
    pub fn process_one(&self, id: &str, force: bool) -> Result<ProcessOutcome, TaskError> {
        let store = self.store()?;

        let Some(task) = store.find_by_id(id)? else {
            return Ok(ProcessOutcome::NotFound);
        };
        if task.status == TaskStatus::Running {
            return Ok(ProcessOutcome::CurrentlyRunning);
        }
        if task.status != TaskStatus::Queued {
            if !force {
                return Ok(ProcessOutcome::NotQueued);
            }
            if !store.requeue(id)? {
                return Ok(ProcessOutcome::CurrentlyRunning);
            }
        }

        if !store.claim(id)? {
            // A worker got there first.
            return Ok(ProcessOutcome::CurrentlyRunning);
        }
        let Some(task) = store.find_by_id(id)? else {
            return Ok(ProcessOutcome::NotFound);
        };
        Ok(ProcessOutcome::Executed(self.execute(store.as_ref(), task)))
    }

    /// Run the handler of a claimed entry and commit its final state.
    fn execute(&self, store: &dyn TaskStore, task: QueuedTask) -> TaskStatus {
        let start = Instant::now();
        let _in_flight = InFlight::enter(&self.in_flight, &task.id);

        let Some(handler) = self.services.registry.instantiate(&task.alias) else {
            warn!("No handler registered for task {} ({})", task.id, task.alias);
            self.commit(
                store,
                &task,
                TaskStatus::Failed,
                Some(UNKNOWN_ALIAS_LINE.to_string()),
            );
            metrics::record_task_execution(&task.alias, TaskStatus::Failed, start.elapsed());
            return TaskStatus::Failed;
        };

        info!(
            "Running task {} ({}), attempt {}",
            task.id, task.alias, task.attempts
        );
        let mut ctx = TaskContext::for_queued_task(self.services.clone(), &task);
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut ctx)));

        let (status, line) = match result {
            Ok(TaskOutcome::Succeeded) => (TaskStatus::Succeeded, None),
            Ok(TaskOutcome::Failed(reason)) => (
                TaskStatus::Failed,
                Some(format_log_line(
                    LogLevel::Error,
                    &format!("Task failed: {}", reason),
                )),
            ),
            Ok(TaskOutcome::Incomplete) => (
                TaskStatus::Failed,
                Some(format_log_line(LogLevel::Info, INCOMPLETE_MARKER)),
            ),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Task {} ({}) panicked: {}", task.id, task.alias, message);
                (
                    TaskStatus::Failed,
                    Some(format_log_line(
                        LogLevel::Error,
                        &format!("Task panicked: {}", message),
                    )),
                )
            }
        };

        self.commit(store, &task, status, line);
        let elapsed = start.elapsed();
        metrics::record_task_execution(&task.alias, status, elapsed);
        info!(
            "Task {} ({}) finished as {} in {:?}",
            task.id, task.alias, status, elapsed
        );
        status
    }

    fn commit(
        &self,
        store: &dyn TaskStore,
        task: &QueuedTask,
        status: TaskStatus,
        line: Option<String>,
    ) {
        match store.finish(&task.id, status, line.as_deref()) {
            Ok(true) => {}
            Ok(false) => warn!(
                "Task {} ({}) was no longer running when finishing as {}",
                task.id, task.alias, status
            ),
            Err(e) => error!("Failed to record final state of task {}: {}", task.id, e),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
