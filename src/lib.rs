//! Siteworks Server Library
//!
//! Task queue, scheduled jobs, thumbnail service and the stores they work on.
//! Exposed as a library so the binary, the CLI and the integration tests share
//! the same wiring.

pub mod app_services;
pub mod blind_index_store;
pub mod cli;
pub mod config;
pub mod file_cache;
pub mod geo;
pub mod schedules;
pub mod server;
pub mod sqlite_persistence;
pub mod stats_store;
pub mod task_store;
pub mod tasks;
pub mod thumbnail;
pub mod user_agent;
pub mod user_store;
pub mod vault_store;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use app_services::AppServices;
pub use config::{AppConfig, CliConfig, FileConfig};
pub use server::{run_server, RequestsLoggingLevel};
pub use task_store::{SqliteTaskStore, TaskStore};
pub use tasks::{TaskQueueOptions, TaskQueueRunner};
