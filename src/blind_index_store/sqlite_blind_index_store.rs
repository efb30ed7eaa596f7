use super::{BlindIndexKind, BlindIndexStore, BlindIndexStores, SearchValue};
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_db, SqlType, Table, VersionedSchema};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

macro_rules! blind_index_table {
    ($name:expr, $value_index:expr) => {
        Table {
            name: $name,
            columns: &[
                sqlite_column!("id", &SqlType::Text, is_primary_key = true),
                sqlite_column!(
                    "source_reference_id",
                    &SqlType::Text,
                    non_null = true,
                    is_unique = true
                ),
                sqlite_column!("search_value", &SqlType::Text, non_null = true),
                sqlite_column!("created_at", &SqlType::Text, non_null = true),
                sqlite_column!("updated_at", &SqlType::Text, non_null = true),
            ],
            indices: &[($value_index, "search_value")],
        }
    };
}

const EMAIL_TABLE_V1: Table = blind_index_table!(
    "blind_index_email",
    "idx_blind_index_email_value"
);
const FIRST_NAME_TABLE_V1: Table = blind_index_table!(
    "blind_index_first_name",
    "idx_blind_index_first_name_value"
);
const LAST_NAME_TABLE_V1: Table = blind_index_table!(
    "blind_index_last_name",
    "idx_blind_index_last_name_value"
);

pub const BLIND_INDEX_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[EMAIL_TABLE_V1, FIRST_NAME_TABLE_V1, LAST_NAME_TABLE_V1],
    migration: None,
}];

pub struct SqliteBlindIndexStore {
    conn: Arc<Mutex<Connection>>,
    kind: BlindIndexKind,
}

impl SqliteBlindIndexStore {
    /// Open the blind index database and return one store per indexed field.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<BlindIndexStores> {
        let conn = open_versioned_db(
            db_path.as_ref(),
            "blind index",
            BLIND_INDEX_VERSIONED_SCHEMAS,
        )?;
        let conn = Arc::new(Mutex::new(conn));
        let store = |kind| -> Arc<dyn BlindIndexStore> {
            Arc::new(SqliteBlindIndexStore {
                conn: conn.clone(),
                kind,
            })
        };
        Ok(BlindIndexStores {
            email: store(BlindIndexKind::Email),
            first_name: store(BlindIndexKind::FirstName),
            last_name: store(BlindIndexKind::LastName),
        })
    }

    fn table(&self) -> &'static str {
        self.kind.table_name()
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn row_to_search_value(row: &rusqlite::Row) -> rusqlite::Result<SearchValue> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };
        Ok(SearchValue {
            id: row.get("id")?,
            source_reference_id: row.get("source_reference_id")?,
            search_value: row.get("search_value")?,
            created_at: parse(&created_at),
            updated_at: parse(&updated_at),
        })
    }
}

impl BlindIndexStore for SqliteBlindIndexStore {
    fn kind(&self) -> BlindIndexKind {
        self.kind
    }

    fn truncate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(&format!("DELETE FROM {}", self.table()), [])
            .with_context(|| format!("Failed to truncate {}", self.table()))?;
        Ok(())
    }

    fn find_by_source_reference_id(
        &self,
        source_reference_id: &str,
    ) -> Result<Option<SearchValue>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE source_reference_id = ?1",
                    self.table()
                ),
                params![source_reference_id],
                Self::row_to_search_value,
            )
            .optional()?;
        Ok(value)
    }

    fn create(&self, source_reference_id: &str, search_value: &str) -> Result<SearchValue> {
        let now = Utc::now();
        let value = SearchValue {
            id: uuid::Uuid::new_v4().to_string(),
            source_reference_id: source_reference_id.to_string(),
            search_value: search_value.to_string(),
            created_at: now,
            updated_at: now,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (id, source_reference_id, search_value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                self.table()
            ),
            params![
                value.id,
                value.source_reference_id,
                value.search_value,
                Self::format_datetime(&value.created_at),
                Self::format_datetime(&value.updated_at),
            ],
        )?;
        Ok(value)
    }

    fn update(&self, value: &SearchValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET search_value = ?1, updated_at = ?2 WHERE id = ?3",
                self.table()
            ),
            params![
                value.search_value,
                Self::format_datetime(&Utc::now()),
                value.id
            ],
        )?;
        if updated == 0 {
            bail!("Search value not found: {}", value.id);
        }
        Ok(())
    }

    fn delete(&self, value: &SearchValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table()),
            params![value.id],
        )?;
        Ok(())
    }

    fn search(&self, search_value: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT source_reference_id FROM {} WHERE search_value = ?1",
            self.table()
        ))?;
        let ids = stmt
            .query_map(params![search_value], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn list(&self) -> Result<Vec<SearchValue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY created_at ASC, rowid ASC",
            self.table()
        ))?;
        let values = stmt
            .query_map([], Self::row_to_search_value)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_stores() -> (BlindIndexStores, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let stores = SqliteBlindIndexStore::open(temp_dir.path().join("blind_index.db")).unwrap();
        (stores, temp_dir)
    }

    #[test]
    fn stores_are_isolated_per_field() {
        let (stores, _dir) = open_stores();
        stores.email.create("u1", "a@b.com").unwrap();

        assert_eq!(stores.email.list().unwrap().len(), 1);
        assert!(stores.first_name.list().unwrap().is_empty());
        assert_eq!(stores.email.kind(), BlindIndexKind::Email);
        assert_eq!(stores.last_name.kind(), BlindIndexKind::LastName);
    }

    #[test]
    fn one_row_per_source_reference_id() {
        let (stores, _dir) = open_stores();
        stores.email.create("u1", "a@b.com").unwrap();
        assert!(stores.email.create("u1", "other@b.com").is_err());
    }

    #[test]
    fn update_search_and_delete() {
        let (stores, _dir) = open_stores();
        let mut value = stores.first_name.create("u1", "Ada").unwrap();
        value.search_value = "Grace".to_string();
        stores.first_name.update(&value).unwrap();

        assert_eq!(stores.first_name.search("Grace").unwrap(), vec!["u1"]);
        assert!(stores.first_name.search("Ada").unwrap().is_empty());

        let found = stores
            .first_name
            .find_by_source_reference_id("u1")
            .unwrap()
            .unwrap();
        stores.first_name.delete(&found).unwrap();
        assert!(stores
            .first_name
            .find_by_source_reference_id("u1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn truncate_only_empties_its_table() {
        let (stores, _dir) = open_stores();
        stores.email.create("u1", "a@b.com").unwrap();
        stores.last_name.create("u1", "Lovelace").unwrap();

        stores.email.truncate().unwrap();
        assert!(stores.email.list().unwrap().is_empty());
        assert_eq!(stores.last_name.list().unwrap().len(), 1);
    }

    #[test]
    fn parse_index_names() {
        assert_eq!(BlindIndexKind::parse("email"), Some(BlindIndexKind::Email));
        assert_eq!(
            BlindIndexKind::parse("first_name"),
            Some(BlindIndexKind::FirstName)
        );
        assert_eq!(BlindIndexKind::parse("all"), None);
    }
}
