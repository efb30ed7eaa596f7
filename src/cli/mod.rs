//! One-shot commands run instead of the server when trailing arguments are given.
//!
//! ```text
//! task <alias> [--key=value ...]
//! job --task_id=<id> [--force=yes]
//! routes list
//! ```

mod job;

pub use job::{run_job, JobRunReport};

use crate::app_services::AppServices;
use crate::server::ROUTES;
use crate::tasks::{TaskContext, TaskParams};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const COMMAND_TASK: &str = "task";
pub const COMMAND_JOB: &str = "job";
pub const COMMAND_ROUTES: &str = "routes";
pub const SUBCOMMAND_LIST: &str = "list";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("no command provided")]
    NoCommand,

    #[error("unrecognized command: {0}")]
    UnrecognizedCommand(String),

    #[error("missing task alias for command 'task'")]
    MissingTaskAlias,

    #[error("task store is not configured")]
    TaskStoreNotConfigured,

    #[error("unknown task alias: {0}")]
    UnknownTask(String),

    #[error("invalid or missing subcommand for 'routes'. Use 'routes list'")]
    InvalidRoutesSubcommand,
}

type CommandHandler = fn(&Arc<AppServices>, &[String]) -> Result<(), CliError>;

fn command_handler(command: &str) -> Option<CommandHandler> {
    match command {
        COMMAND_TASK => Some(handle_task_command),
        COMMAND_JOB => Some(handle_job_command),
        COMMAND_ROUTES => Some(handle_routes_command),
        _ => None,
    }
}

/// Dispatch `args[0]` with the remaining arguments.
pub fn execute_cli_command(services: &Arc<AppServices>, args: &[String]) -> Result<(), CliError> {
    info!("Executing command: {:?}", args);

    let Some((command, rest)) = args.split_first() else {
        warn!("No command provided.");
        return Err(CliError::NoCommand);
    };

    let Some(handler) = command_handler(command) else {
        let err = CliError::UnrecognizedCommand(command.clone());
        warn!("{}", err);
        return Err(err);
    };

    handler(services, rest)
}

/// Runs the handler in the foreground. Its outcome goes to the log, not the exit code.
fn handle_task_command(services: &Arc<AppServices>, args: &[String]) -> Result<(), CliError> {
    let Some((alias, task_args)) = args.split_first() else {
        return Err(CliError::MissingTaskAlias);
    };
    if services.task_store.is_none() {
        return Err(CliError::TaskStoreNotConfigured);
    }
    let Some(handler) = services.registry.instantiate(alias) else {
        return Err(CliError::UnknownTask(alias.clone()));
    };

    let params = TaskParams::from_cli_args(task_args);
    info!("Running task {} with {:?}", alias, params);
    let mut ctx = TaskContext::new(services.clone(), params);
    let outcome = handler.handle(&mut ctx);
    info!("Task {} finished: {:?}", alias, outcome);
    Ok(())
}

fn handle_job_command(services: &Arc<AppServices>, args: &[String]) -> Result<(), CliError> {
    run_job(services, args);
    Ok(())
}

fn handle_routes_command(_services: &Arc<AppServices>, args: &[String]) -> Result<(), CliError> {
    if args.first().map(String::as_str) != Some(SUBCOMMAND_LIST) {
        return Err(CliError::InvalidRoutesSubcommand);
    }
    println!("{:<8} {:<45} DESCRIPTION", "METHOD", "PATH");
    for route in ROUTES {
        println!(
            "{:<8} {:<45} {}",
            route.method, route.path, route.description
        );
    }
    Ok(())
}
