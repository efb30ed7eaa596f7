//! Shared fixtures for unit tests.

use crate::app_services::AppServices;
use crate::blind_index_store::SqliteBlindIndexStore;
use crate::config::ServiceSettings;
use crate::geo::GeoLocator;
use crate::stats_store::SqliteStatsStore;
use crate::task_store::{SqliteTaskStore, TaskStore};
use crate::tasks::{handlers, TaskRegistry};
use crate::user_store::SqliteUserStore;
use crate::vault_store::SqliteVaultStore;
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const TEST_VAULT_KEY: &str = "test-vault-key";

/// Geo locator that answers from a fixed body and counts lookups.
pub struct CountingGeoLocator {
    response: Option<String>,
    calls: AtomicUsize,
    ips: Mutex<Vec<String>>,
}

impl CountingGeoLocator {
    pub fn answering(body: &str) -> Self {
        Self {
            response: Some(body.to_string()),
            calls: AtomicUsize::new(0),
            ips: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
            ips: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ips(&self) -> Vec<String> {
        self.ips.lock().unwrap().clone()
    }
}

impl GeoLocator for CountingGeoLocator {
    fn lookup(&self, ip: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ips.lock().unwrap().push(ip.to_string());
        match &self.response {
            Some(body) => Ok(body.clone()),
            None => bail!("geo endpoint unreachable"),
        }
    }
}

fn test_settings() -> ServiceSettings {
    ServiceSettings {
        vault_key: TEST_VAULT_KEY.to_string(),
        ..Default::default()
    }
}

/// No stores, no handlers, and a geo locator that never touches the network.
pub fn empty_services() -> AppServices {
    AppServices::new(test_settings(), TaskRegistry::new())
        .with_geo_locator(Arc::new(CountingGeoLocator::failing()))
}

pub fn services_with_task_store(store: Arc<dyn TaskStore>) -> AppServices {
    empty_services().with_task_store(store)
}

pub fn services_with_registry(registry: TaskRegistry, store: Arc<dyn TaskStore>) -> AppServices {
    AppServices::new(test_settings(), registry)
        .with_geo_locator(Arc::new(CountingGeoLocator::failing()))
        .with_task_store(store)
}

/// Every SQLite store in one temp dir, with the built-in handlers registered.
pub struct StoresFixture {
    pub task_store: Arc<SqliteTaskStore>,
    pub user_store: Arc<SqliteUserStore>,
    pub vault_store: Arc<SqliteVaultStore>,
    pub stats_store: Arc<SqliteStatsStore>,
    pub geo: Arc<CountingGeoLocator>,
    pub temp_dir: TempDir,
}

impl StoresFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        Self {
            task_store: Arc::new(SqliteTaskStore::new(dir.join("tasks.db")).unwrap()),
            user_store: Arc::new(SqliteUserStore::new(dir.join("users.db")).unwrap()),
            vault_store: Arc::new(SqliteVaultStore::new(dir.join("vault.db")).unwrap()),
            stats_store: Arc::new(SqliteStatsStore::new(dir.join("stats.db")).unwrap()),
            geo: Arc::new(CountingGeoLocator::answering("1;DE;DEU;Germany")),
            temp_dir,
        }
    }

    pub fn with_geo(mut self, geo: CountingGeoLocator) -> Self {
        self.geo = Arc::new(geo);
        self
    }

    /// Services wired to every store of the fixture.
    pub fn services(&self) -> AppServices {
        let mut registry = TaskRegistry::new();
        handlers::register_tasks(&mut registry).unwrap();
        let blind_indexes =
            SqliteBlindIndexStore::open(self.temp_dir.path().join("blind_index.db")).unwrap();

        AppServices::new(test_settings(), registry)
            .with_geo_locator(self.geo.clone())
            .with_task_store(self.task_store.clone())
            .with_user_store(self.user_store.clone())
            .with_vault_store(self.vault_store.clone())
            .with_blind_index_stores(blind_indexes)
            .with_stats_store(self.stats_store.clone())
    }
}
