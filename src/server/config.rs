use super::RequestsLoggingLevel;
use crate::config::AppConfig;
use std::path::PathBuf;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Uploaded files served under `/files`. Not served when unset.
    pub files_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
            files_dir: Some(config.files_dir.clone()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            files_dir: None,
        }
    }
}
