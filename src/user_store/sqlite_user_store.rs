use super::{User, UserStatus, UserStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_db, SqlType, Table, VersionedSchema};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("first_name", &SqlType::Text, non_null = true),
        sqlite_column!("last_name", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_users_status", "status")],
};

pub const USER_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[USERS_TABLE_V1],
    migration: None,
}];

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), "user", USER_STORE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let status: String = row.get("status")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };

        Ok(User {
            id: row.get("id")?,
            status: UserStatus::parse(&status).unwrap_or(UserStatus::Inactive),
            email: row.get("email")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            created_at: parse(&created_at),
            updated_at: parse(&updated_at),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, status, email, first_name, last_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.status.as_str(),
                user.email,
                user.first_name,
                user.last_name,
                Self::format_datetime(&user.created_at),
                Self::format_datetime(&user.updated_at),
            ],
        )
        .with_context(|| format!("Failed to create user {}", user.id))?;
        Ok(())
    }

    fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM users WHERE status != ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let users = stmt
            .query_map(params![UserStatus::Deleted.as_str()], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET status = ?1, email = ?2, first_name = ?3, last_name = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                user.status.as_str(),
                user.email,
                user.first_name,
                user.last_name,
                Self::format_datetime(&Utc::now()),
                user.id,
            ],
        )?;
        if updated == 0 {
            bail!("User not found: {}", user.id);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteUserStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteUserStore::new(temp_dir.path().join("users.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn create_find_update_delete() {
        let (store, _dir) = create_test_store();
        let user = User::new("u1").with_email("tk_email");
        store.create_user(&user).unwrap();

        let mut loaded = store.find_user_by_id("u1").unwrap().unwrap();
        assert_eq!(loaded.email, "tk_email");
        assert_eq!(loaded.first_name, "");

        loaded.first_name = "tk_first".to_string();
        store.update_user(&loaded).unwrap();
        assert_eq!(
            store.find_user_by_id("u1").unwrap().unwrap().first_name,
            "tk_first"
        );

        assert!(store.delete_user("u1").unwrap());
        assert!(store.find_user_by_id("u1").unwrap().is_none());
        assert!(store.update_user(&loaded).is_err());
    }

    #[test]
    fn list_skips_deleted_users() {
        let (store, _dir) = create_test_store();
        store.create_user(&User::new("u1")).unwrap();
        let mut gone = User::new("u2");
        gone.status = UserStatus::Deleted;
        store.create_user(&gone).unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "u1");
    }
}
