use super::TaskParams;
use crate::app_services::AppServices;
use crate::task_store::QueuedTask;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        }
    }
}

/// One line of a task log: `{timestamp} [LEVEL] message`.
pub fn format_log_line(level: LogLevel, message: &str) -> String {
    format!(
        "{} [{}] {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        level.as_str(),
        message
    )
}

/// Everything a single handler execution sees.
///
/// When the execution belongs to a queue entry, parameters come from the entry's
/// payload and every log line is also appended to the entry's details.
pub struct TaskContext {
    services: Arc<AppServices>,
    params: TaskParams,
    queued_task_id: Option<String>,
    log_lines: Vec<String>,
}

impl TaskContext {
    /// Context for a direct (CLI) run.
    pub fn new(services: Arc<AppServices>, params: TaskParams) -> Self {
        Self {
            services,
            params,
            queued_task_id: None,
            log_lines: Vec::new(),
        }
    }

    /// Context bound to a claimed queue entry.
    pub fn for_queued_task(services: Arc<AppServices>, task: &QueuedTask) -> Self {
        Self {
            services,
            params: task.params.clone(),
            queued_task_id: Some(task.id.clone()),
            log_lines: Vec::new(),
        }
    }

    pub fn param(&self, key: &str) -> &str {
        self.params.get(key)
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    pub fn services(&self) -> &Arc<AppServices> {
        &self.services
    }

    pub fn queued_task_id(&self) -> Option<&str> {
        self.queued_task_id.as_deref()
    }

    pub fn has_queued_task(&self) -> bool {
        self.queued_task_id.is_some()
    }

    /// Lines logged so far, in call order.
    pub fn log_lines(&self) -> &[String] {
        &self.log_lines
    }

    pub fn log_info(&mut self, message: impl AsRef<str>) {
        info!("{}", message.as_ref());
        self.append(LogLevel::Info, message.as_ref());
    }

    pub fn log_error(&mut self, message: impl AsRef<str>) {
        error!("{}", message.as_ref());
        self.append(LogLevel::Error, message.as_ref());
    }

    pub fn log_success(&mut self, message: impl AsRef<str>) {
        info!("{}", message.as_ref());
        self.append(LogLevel::Success, message.as_ref());
    }

    fn append(&mut self, level: LogLevel, message: &str) {
        let line = format_log_line(level, message);
        if let (Some(id), Some(store)) = (&self.queued_task_id, &self.services.task_store) {
            if let Err(e) = store.append_details(id, &line) {
                warn!("Failed to append details to task {}: {}", id, e);
            }
        }
        self.log_lines.push(line);
    }
}
