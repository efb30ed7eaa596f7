mod file_config;

pub use file_config::{
    FileCacheConfig, FileConfig, GeoConfig, SchedulesConfig, StoresConfig, TaskQueueConfig,
};

use crate::geo::DEFAULT_GEO_ENDPOINT;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub resources_dir: Option<PathBuf>,
    pub files_dir: Option<PathBuf>,
    pub asset_base_url: Option<String>,
    pub vault_key: Option<String>,
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub resources_dir: PathBuf,
    pub files_dir: PathBuf,
    pub asset_base_url: String,
    pub vault_key: String,

    // Feature configs (with defaults)
    pub stores: StoreSettings,
    pub geo: GeoSettings,
    pub task_queue: TaskQueueSettings,
    pub schedules: ScheduleSettings,
    pub file_cache: FileCacheSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let resources_dir = file
            .resources_dir
            .map(PathBuf::from)
            .or_else(|| cli.resources_dir.clone())
            .unwrap_or_else(|| db_dir.join("resources"));
        let files_dir = file
            .files_dir
            .map(PathBuf::from)
            .or_else(|| cli.files_dir.clone())
            .unwrap_or_else(|| db_dir.join("files"));
        let asset_base_url = file
            .asset_base_url
            .or_else(|| cli.asset_base_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let vault_key = file
            .vault_key
            .or_else(|| cli.vault_key.clone())
            .unwrap_or_default();

        let stores_file = file.stores.unwrap_or_default();
        let stores = StoreSettings {
            task_store: stores_file.task_store.unwrap_or(true),
            user_store: stores_file.user_store.unwrap_or(true),
            vault_store: stores_file.vault_store.unwrap_or(true),
            blind_index_store: stores_file.blind_index_store.unwrap_or(true),
            stats_store: stores_file.stats_store.unwrap_or(true),
            file_cache: stores_file.file_cache.unwrap_or(true),
        };

        let geo_file = file.geo.unwrap_or_default();
        let geo_defaults = GeoSettings::default();
        let geo = GeoSettings {
            endpoint: geo_file.endpoint.unwrap_or(geo_defaults.endpoint),
            timeout_secs: geo_file.timeout_secs.unwrap_or(geo_defaults.timeout_secs),
        };

        let queue_file = file.task_queue.unwrap_or_default();
        let queue_defaults = TaskQueueSettings::default();
        let task_queue = TaskQueueSettings {
            enabled: queue_file.enabled.unwrap_or(queue_defaults.enabled),
            max_concurrent: queue_file
                .max_concurrent
                .or(cli.max_concurrent_tasks)
                .unwrap_or(queue_defaults.max_concurrent),
            poll_interval_secs: queue_file
                .poll_interval_secs
                .unwrap_or(queue_defaults.poll_interval_secs),
            unstuck_after_secs: queue_file
                .unstuck_after_secs
                .unwrap_or(queue_defaults.unstuck_after_secs),
        };
        if task_queue.max_concurrent == 0 {
            bail!("task_queue.max_concurrent must be at least 1");
        }

        let schedules_file = file.schedules.unwrap_or_default();
        let schedule_defaults = ScheduleSettings::default();
        let schedules = ScheduleSettings {
            enabled: schedules_file.enabled.unwrap_or(schedule_defaults.enabled),
            stats_visitor_enhance_interval_secs: schedules_file
                .stats_visitor_enhance_interval_secs
                .unwrap_or(schedule_defaults.stats_visitor_enhance_interval_secs),
            blind_index_rebuild_interval_secs: schedules_file
                .blind_index_rebuild_interval_secs
                .unwrap_or(schedule_defaults.blind_index_rebuild_interval_secs),
            clean_up_interval_secs: schedules_file
                .clean_up_interval_secs
                .unwrap_or(schedule_defaults.clean_up_interval_secs),
            queue_clear_interval_secs: schedules_file
                .queue_clear_interval_secs
                .unwrap_or(schedule_defaults.queue_clear_interval_secs),
        };

        let cache_file = file.file_cache.unwrap_or_default();
        let file_cache = FileCacheSettings {
            dir: cache_file
                .dir
                .map(PathBuf::from)
                .unwrap_or_else(|| db_dir.join("cache")),
            expiry_sweep_secs: cache_file
                .expiry_sweep_secs
                .unwrap_or(FileCacheSettings::DEFAULT_EXPIRY_SWEEP_SECS),
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            resources_dir,
            files_dir,
            asset_base_url,
            vault_key,
            stores,
            geo,
            task_queue,
            schedules,
            file_cache,
        })
    }

    pub fn task_db_path(&self) -> PathBuf {
        self.db_dir.join("tasks.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("users.db")
    }

    pub fn vault_db_path(&self) -> PathBuf {
        self.db_dir.join("vault.db")
    }

    pub fn blind_index_db_path(&self) -> PathBuf {
        self.db_dir.join("blind_index.db")
    }

    pub fn stats_db_path(&self) -> PathBuf {
        self.db_dir.join("stats.db")
    }

    /// Settings the task handlers and the thumbnail service read at run time.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            vault_key: self.vault_key.clone(),
            geo_endpoint: self.geo.endpoint.clone(),
            geo_timeout: Duration::from_secs(self.geo.timeout_secs),
            asset_base_url: self.asset_base_url.clone(),
            resources_dir: self.resources_dir.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub task_store: bool,
    pub user_store: bool,
    pub vault_store: bool,
    pub blind_index_store: bool,
    pub stats_store: bool,
    pub file_cache: bool,
}

#[derive(Debug, Clone)]
pub struct GeoSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEO_ENDPOINT.to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskQueueSettings {
    pub enabled: bool,
    pub max_concurrent: usize,
    pub poll_interval_secs: u64,
    pub unstuck_after_secs: u64,
}

impl Default for TaskQueueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 10,
            poll_interval_secs: 2,
            unstuck_after_secs: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub stats_visitor_enhance_interval_secs: u64,
    pub blind_index_rebuild_interval_secs: u64,
    pub clean_up_interval_secs: u64,
    pub queue_clear_interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            stats_visitor_enhance_interval_secs: 2 * 60,
            blind_index_rebuild_interval_secs: 60 * 60,
            clean_up_interval_secs: 20 * 60,
            queue_clear_interval_secs: 2 * 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCacheSettings {
    pub dir: PathBuf,
    pub expiry_sweep_secs: u64,
}

impl FileCacheSettings {
    pub const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 60;
}

/// Run-time settings shared with task handlers and the thumbnail service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub vault_key: String,
    pub geo_endpoint: String,
    pub geo_timeout: Duration,
    pub asset_base_url: String,
    pub resources_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let geo = GeoSettings::default();
        Self {
            vault_key: String::new(),
            geo_endpoint: geo.endpoint,
            geo_timeout: Duration::from_secs(geo.timeout_secs),
            asset_base_url: "http://localhost:3001".to_string(),
            resources_dir: PathBuf::from("resources"),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
