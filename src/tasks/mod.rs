//! Task handlers and the queue that runs them.
//!
//! A handler is looked up by alias in the [`TaskRegistry`] and executed either
//! directly from the CLI or by the [`TaskQueueRunner`] for a persisted queue entry.

mod context;
mod handler;
pub mod handlers;
mod params;
mod registry;
mod runner;

pub use context::{format_log_line, LogLevel, TaskContext};
pub use handler::{TaskHandler, TaskOutcome};
pub use params::TaskParams;
pub use registry::{TaskDescriptor, TaskFactory, TaskRegistry};
pub use runner::{ProcessOutcome, TaskQueueOptions, TaskQueueRunner, INCOMPLETE_MARKER};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task store is not configured")]
    NotConfigured,

    #[error("task alias already registered: {0}")]
    DuplicateAlias(String),

    #[error("unknown task alias: {0}")]
    UnknownAlias(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
