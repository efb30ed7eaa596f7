use super::{JobContext, JobRunResult, ScheduledJob};
use crate::app_services::AppServices;
use crate::server::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

struct ScheduledEntry {
    job: Arc<dyn ScheduledJob>,
    next_run_at: Instant,
}

/// Runs registered jobs at their interval until the shutdown token is cancelled.
///
/// Jobs run one after the other on the blocking pool; a job never overlaps itself.
/// The first run of each job happens one interval after start.
pub struct Scheduler {
    entries: Vec<ScheduledEntry>,
    services: Arc<AppServices>,
    shutdown_token: CancellationToken,
}

impl Scheduler {
    pub fn new(services: Arc<AppServices>, shutdown_token: CancellationToken) -> Self {
        Self {
            entries: Vec::new(),
            services,
            shutdown_token,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        info!(
            "Registering scheduled job: {} every {:?} - {}",
            job.id(),
            job.interval(),
            job.description()
        );
        self.entries.push(ScheduledEntry {
            next_run_at: Instant::now() + job.interval(),
            job,
        });
    }

    pub fn job_count(&self) -> usize {
        self.entries.len()
    }

    pub async fn run(mut self) {
        if self.entries.is_empty() {
            info!("No scheduled jobs registered; scheduler not started");
            return;
        }
        info!("Starting scheduler with {} jobs", self.entries.len());

        loop {
            let next_wake = self
                .entries
                .iter()
                .map(|e| e.next_run_at)
                .min()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(60));
            debug!(
                "Scheduler sleeping for {:?}",
                next_wake.saturating_duration_since(Instant::now())
            );

            tokio::select! {
                _ = tokio::time::sleep_until(next_wake) => {
                    self.run_due_jobs().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }

    async fn run_due_jobs(&mut self) {
        let now = Instant::now();
        for index in 0..self.entries.len() {
            if self.entries[index].next_run_at > now {
                continue;
            }
            if self.shutdown_token.is_cancelled() {
                return;
            }
            let job = self.entries[index].job.clone();
            self.run_job(job.clone()).await;
            self.entries[index].next_run_at = Instant::now() + job.interval();
        }
    }

    /// Run one job to completion. Errors are logged and counted, never propagated.
    pub async fn run_job(&self, job: Arc<dyn ScheduledJob>) -> Option<JobRunResult> {
        let ctx = JobContext::new(self.shutdown_token.child_token(), self.services.clone());
        let job_id = job.id();
        let start = std::time::Instant::now();

        let result = tokio::task::spawn_blocking(move || job.run(&ctx)).await;
        let elapsed = start.elapsed();

        let (outcome, label) = match result {
            Ok(Ok(JobRunResult::Done(message))) => {
                info!("Scheduled job {}: {} ({:?})", job_id, message, elapsed);
                (Some(JobRunResult::Done(message)), "success")
            }
            Ok(Ok(JobRunResult::Skipped(message))) => {
                debug!("Scheduled job {} skipped: {}", job_id, message);
                (Some(JobRunResult::Skipped(message)), "skipped")
            }
            Ok(Err(e)) => {
                error!("Scheduled job {} failed after {:?}: {}", job_id, elapsed, e);
                (None, "failed")
            }
            Err(e) => {
                error!("Scheduled job {} panicked after {:?}: {}", job_id, elapsed, e);
                (None, "panic")
            }
        };
        metrics::record_scheduled_job_run(job_id, label, elapsed);
        outcome
    }
}
