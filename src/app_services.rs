//! The application's collaborators, assembled once at startup and shared by
//! the HTTP server, the CLI, the task queue and the schedules.

use crate::blind_index_store::{BlindIndexKind, BlindIndexStore, BlindIndexStores, SqliteBlindIndexStore};
use crate::config::{AppConfig, ServiceSettings};
use crate::file_cache::FileCache;
use crate::geo::{GeoLocator, HttpGeoLocator};
use crate::stats_store::{SqliteStatsStore, StatsStore};
use crate::task_store::{QueuedTask, SqliteTaskStore, TaskStore};
use crate::tasks::{handlers, TaskError, TaskParams, TaskRegistry};
use crate::user_store::{SqliteUserStore, UserStore};
use crate::vault_store::{SqliteVaultStore, VaultStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct AppServices {
    pub settings: ServiceSettings,
    pub registry: Arc<TaskRegistry>,
    pub task_store: Option<Arc<dyn TaskStore>>,
    pub user_store: Option<Arc<dyn UserStore>>,
    pub vault_store: Option<Arc<dyn VaultStore>>,
    pub blind_index_email: Option<Arc<dyn BlindIndexStore>>,
    pub blind_index_first_name: Option<Arc<dyn BlindIndexStore>>,
    pub blind_index_last_name: Option<Arc<dyn BlindIndexStore>>,
    pub stats_store: Option<Arc<dyn StatsStore>>,
    pub file_cache: Option<Arc<FileCache>>,
    pub geo_locator: Arc<dyn GeoLocator>,
}

impl AppServices {
    /// Services with no optional stores attached.
    pub fn new(settings: ServiceSettings, registry: TaskRegistry) -> Self {
        let geo_locator = Arc::new(HttpGeoLocator::new(
            settings.geo_endpoint.clone(),
            settings.geo_timeout,
        ));
        Self {
            settings,
            registry: Arc::new(registry),
            task_store: None,
            user_store: None,
            vault_store: None,
            blind_index_email: None,
            blind_index_first_name: None,
            blind_index_last_name: None,
            stats_store: None,
            file_cache: None,
            geo_locator,
        }
    }

    /// Open every store enabled in `config` and register the built-in task handlers.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let mut registry = TaskRegistry::new();
        handlers::register_tasks(&mut registry).context("Failed to register task handlers")?;

        let mut services = Self::new(config.service_settings(), registry);
        let stores = &config.stores;

        if stores.task_store {
            let store = SqliteTaskStore::new(config.task_db_path())
                .context("Failed to open task store")?;
            services = services.with_task_store(Arc::new(store));
        }
        if stores.user_store {
            let store = SqliteUserStore::new(config.user_db_path())
                .context("Failed to open user store")?;
            services = services.with_user_store(Arc::new(store));
        }
        if stores.vault_store {
            let store = SqliteVaultStore::new(config.vault_db_path())
                .context("Failed to open vault store")?;
            services = services.with_vault_store(Arc::new(store));
        }
        if stores.blind_index_store {
            let blind_indexes = SqliteBlindIndexStore::open(config.blind_index_db_path())
                .context("Failed to open blind index store")?;
            services = services.with_blind_index_stores(blind_indexes);
        }
        if stores.stats_store {
            let store = SqliteStatsStore::new(config.stats_db_path())
                .context("Failed to open stats store")?;
            services = services.with_stats_store(Arc::new(store));
        }
        if stores.file_cache {
            let cache = FileCache::new(&config.file_cache.dir).with_context(|| {
                format!("Failed to open file cache at {:?}", config.file_cache.dir)
            })?;
            services = services.with_file_cache(Arc::new(cache));
        }

        info!(
            "Application services ready ({} task handlers registered)",
            services.registry.len()
        );
        Ok(services)
    }

    pub fn with_task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn with_user_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.user_store = Some(store);
        self
    }

    pub fn with_vault_store(mut self, store: Arc<dyn VaultStore>) -> Self {
        self.vault_store = Some(store);
        self
    }

    pub fn with_blind_index_stores(mut self, stores: BlindIndexStores) -> Self {
        self.blind_index_email = Some(stores.email);
        self.blind_index_first_name = Some(stores.first_name);
        self.blind_index_last_name = Some(stores.last_name);
        self
    }

    pub fn with_stats_store(mut self, store: Arc<dyn StatsStore>) -> Self {
        self.stats_store = Some(store);
        self
    }

    pub fn with_file_cache(mut self, cache: Arc<FileCache>) -> Self {
        self.file_cache = Some(cache);
        self
    }

    pub fn with_geo_locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.geo_locator = locator;
        self
    }

    pub fn blind_index_store(&self, kind: BlindIndexKind) -> Option<&Arc<dyn BlindIndexStore>> {
        match kind {
            BlindIndexKind::Email => self.blind_index_email.as_ref(),
            BlindIndexKind::FirstName => self.blind_index_first_name.as_ref(),
            BlindIndexKind::LastName => self.blind_index_last_name.as_ref(),
        }
    }

    /// Enqueue a task by alias through its handler.
    pub fn enqueue_task(&self, alias: &str, params: TaskParams) -> Result<QueuedTask, TaskError> {
        let handler = self
            .registry
            .instantiate(alias)
            .ok_or_else(|| TaskError::UnknownAlias(alias.to_string()))?;
        handler.enqueue(self, params)
    }
}
