//! Users whose personal fields are stored as opaque vault tokens.

mod sqlite_user_store;

pub use sqlite_user_store::{SqliteUserStore, USER_STORE_VERSIONED_SCHEMAS};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            "deleted" => Some(UserStatus::Deleted),
            _ => None,
        }
    }
}

/// A user record. `email`, `first_name` and `last_name` hold vault tokens,
/// or the empty string when the field was never set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub status: UserStatus,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: UserStatus::Active,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, token: impl Into<String>) -> Self {
        self.email = token.into();
        self
    }

    pub fn with_first_name(mut self, token: impl Into<String>) -> Self {
        self.first_name = token.into();
        self
    }

    pub fn with_last_name(mut self, token: impl Into<String>) -> Self {
        self.last_name = token.into();
        self
    }
}

pub trait UserStore: Send + Sync {
    fn create_user(&self, user: &User) -> Result<()>;
    fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;
    /// Every non-deleted user, oldest first.
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;
}
