use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use siteworks_server::cli::execute_cli_command;
use siteworks_server::config::{AppConfig, CliConfig, FileConfig};
use siteworks_server::schedules::{default_jobs, Scheduler};
use siteworks_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use siteworks_server::{AppServices, TaskQueueOptions, TaskQueueRunner};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Runs the HTTP server with its background loops, or executes a single
/// command when one is given after the options (`task`, `job`, `routes list`).
#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Directory of local images served through the thumbnail route.
    #[clap(long, value_parser = parse_path)]
    pub resources_dir: Option<PathBuf>,

    /// Directory of uploaded files served under /files.
    #[clap(long, value_parser = parse_path)]
    pub files_dir: Option<PathBuf>,

    /// Public base URL of this server, used to resolve `files/` thumbnail sources.
    #[clap(long)]
    pub asset_base_url: Option<String>,

    /// Secret the vault encryption key is derived from.
    #[clap(long)]
    pub vault_key: Option<String>,

    /// Upper bound of queued tasks running at the same time.
    #[clap(long)]
    pub max_concurrent_tasks: Option<usize>,

    /// Command to run instead of starting the server.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            resources_dir: self.resources_dir.clone(),
            files_dir: self.files_dir.clone(),
            asset_base_url: self.asset_base_url.clone(),
            vault_key: self.vault_key.clone(),
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let services = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || AppServices::open(&config))
            .await
            .context("Service initialization panicked")??
    };
    let services = Arc::new(services);

    if !cli_args.command.is_empty() {
        let args = cli_args.command.clone();
        let cli_services = services.clone();
        let result = tokio::task::spawn_blocking(move || execute_cli_command(&cli_services, &args))
            .await
            .context("Command panicked")?;
        if let Err(e) = result {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    run_server_mode(config, services).await
}

async fn run_server_mode(config: AppConfig, services: Arc<AppServices>) -> Result<()> {
    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    if config.task_queue.enabled {
        let options = TaskQueueOptions {
            max_concurrent: config.task_queue.max_concurrent,
            poll_interval: Duration::from_secs(config.task_queue.poll_interval_secs),
            unstuck_after: Duration::from_secs(config.task_queue.unstuck_after_secs),
        };
        let runner = Arc::new(TaskQueueRunner::new(services.clone(), options));
        background.push(tokio::spawn(runner.run_workers(shutdown.clone())));
    } else {
        info!("Task queue disabled");
    }

    if config.schedules.enabled {
        let mut scheduler = Scheduler::new(services.clone(), shutdown.clone());
        for job in default_jobs(&config.schedules) {
            scheduler.register_job(job);
        }
        info!("Scheduler started with {} jobs", scheduler.job_count());
        background.push(tokio::spawn(scheduler.run()));
    } else {
        info!("Schedules disabled");
    }

    match &services.file_cache {
        Some(cache) => {
            let interval = Duration::from_secs(config.file_cache.expiry_sweep_secs.max(1));
            background.push(tokio::spawn(
                cache.clone().run_expiry_loop(interval, shutdown.clone()),
            ));
        }
        None => warn!("File cache not configured; thumbnails will not be cached"),
    }

    info!("Metrics available at port {}!", config.metrics_port);
    background.push(tokio::spawn(metrics::run_metrics_server(
        config.metrics_port,
        shutdown.clone(),
    )));

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        ctrl_c_token.cancel();
    });

    info!("Ready to serve at port {}!", config.port);
    let result = run_server(ServerConfig::from_app_config(&config), services, shutdown.clone()).await;

    // The HTTP server may also stop on its own (bind failure); take the loops down with it.
    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            error!("Background loop terminated abnormally: {}", e);
        }
    }
    result
}
