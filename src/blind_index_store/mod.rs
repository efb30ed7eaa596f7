//! Blind indexes: searchable copies of vault-tokenized user fields, one table per field.

mod sqlite_blind_index_store;

pub use sqlite_blind_index_store::{SqliteBlindIndexStore, BLIND_INDEX_VERSIONED_SCHEMAS};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlindIndexKind {
    Email,
    FirstName,
    LastName,
}

impl BlindIndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlindIndexKind::Email => "email",
            BlindIndexKind::FirstName => "first_name",
            BlindIndexKind::LastName => "last_name",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(BlindIndexKind::Email),
            "first_name" => Some(BlindIndexKind::FirstName),
            "last_name" => Some(BlindIndexKind::LastName),
            _ => None,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            BlindIndexKind::Email => "blind_index_email",
            BlindIndexKind::FirstName => "blind_index_first_name",
            BlindIndexKind::LastName => "blind_index_last_name",
        }
    }
}

/// One row of a blind index: at most one per source reference id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchValue {
    pub id: String,
    pub source_reference_id: String,
    pub search_value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub trait BlindIndexStore: Send + Sync {
    fn kind(&self) -> BlindIndexKind;

    /// Remove every row of the index.
    fn truncate(&self) -> Result<()>;

    fn find_by_source_reference_id(&self, source_reference_id: &str)
        -> Result<Option<SearchValue>>;

    fn create(&self, source_reference_id: &str, search_value: &str) -> Result<SearchValue>;

    fn update(&self, value: &SearchValue) -> Result<()>;

    fn delete(&self, value: &SearchValue) -> Result<()>;

    /// Source reference ids whose search value equals `search_value`.
    fn search(&self, search_value: &str) -> Result<Vec<String>>;

    fn list(&self) -> Result<Vec<SearchValue>>;
}

/// The three blind index stores backed by one database.
#[derive(Clone)]
pub struct BlindIndexStores {
    pub email: Arc<dyn BlindIndexStore>,
    pub first_name: Arc<dyn BlindIndexStore>,
    pub last_name: Arc<dyn BlindIndexStore>,
}
