//! Visitor statistics.

mod sqlite_stats_store;

pub use sqlite_stats_store::{SqliteStatsStore, STATS_STORE_VERSIONED_SCHEMAS};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Country value of a visitor that has not been enhanced yet.
pub const COUNTRY_NOT_ENHANCED: &str = "empty";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visitor {
    pub id: String,
    pub path: String,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: String,
    pub country: String,
    pub user_os: String,
    pub user_os_version: String,
    pub user_device: String,
    pub user_device_type: String,
    pub user_browser: String,
    pub user_browser_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visitor {
    pub fn new(
        path: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            referrer: String::new(),
            country: COUNTRY_NOT_ENHANCED.to_string(),
            user_os: String::new(),
            user_os_version: String::new(),
            user_device: String::new(),
            user_device_type: String::new(),
            user_browser: String::new(),
            user_browser_version: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enhanced(&self) -> bool {
        self.country != COUNTRY_NOT_ENHANCED
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisitorQuery {
    pub country: Option<String>,
    pub limit: Option<usize>,
}

impl VisitorQuery {
    pub fn not_enhanced(limit: usize) -> Self {
        Self {
            country: Some(COUNTRY_NOT_ENHANCED.to_string()),
            limit: Some(limit),
        }
    }
}

pub trait StatsStore: Send + Sync {
    fn visitor_create(&self, visitor: &Visitor) -> Result<()>;
    fn visitor_find_by_id(&self, id: &str) -> Result<Option<Visitor>>;
    /// Visitors matching `query`, oldest first.
    fn visitor_list(&self, query: &VisitorQuery) -> Result<Vec<Visitor>>;
    fn visitor_update(&self, visitor: &Visitor) -> Result<()>;
}
