use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub resources_dir: Option<String>,
    pub files_dir: Option<String>,
    pub asset_base_url: Option<String>,
    pub vault_key: Option<String>,

    // Feature configs
    pub stores: Option<StoresConfig>,
    pub geo: Option<GeoConfig>,
    pub task_queue: Option<TaskQueueConfig>,
    pub schedules: Option<SchedulesConfig>,
    pub file_cache: Option<FileCacheConfig>,
}

/// Which optional stores are opened at startup.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StoresConfig {
    pub task_store: Option<bool>,
    pub user_store: Option<bool>,
    pub vault_store: Option<bool>,
    pub blind_index_store: Option<bool>,
    pub stats_store: Option<bool>,
    pub file_cache: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GeoConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TaskQueueConfig {
    pub enabled: Option<bool>,
    pub max_concurrent: Option<usize>,
    pub poll_interval_secs: Option<u64>,
    pub unstuck_after_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulesConfig {
    pub enabled: Option<bool>,
    pub stats_visitor_enhance_interval_secs: Option<u64>,
    pub blind_index_rebuild_interval_secs: Option<u64>,
    pub clean_up_interval_secs: Option<u64>,
    pub queue_clear_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FileCacheConfig {
    pub dir: Option<String>,
    pub expiry_sweep_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
