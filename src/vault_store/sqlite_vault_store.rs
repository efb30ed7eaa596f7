use super::{open, seal, VaultStore, TOKEN_PREFIX};
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_db, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const VAULT_TABLE_V1: Table = Table {
    name: "vault",
    columns: &[
        sqlite_column!("token", &SqlType::Text, is_primary_key = true),
        sqlite_column!("sealed_value", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const VAULT_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[VAULT_TABLE_V1],
    migration: None,
}];

pub struct SqliteVaultStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVaultStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), "vault", VAULT_STORE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl VaultStore for SqliteVaultStore {
    fn tokenize(&self, value: &str, key: &str) -> Result<String> {
        let sealed = seal(value, key)?;
        let token = format!("{}{}", TOKEN_PREFIX, uuid::Uuid::new_v4().simple());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vault (token, sealed_value, created_at) VALUES (?1, ?2, ?3)",
            params![token, sealed, Utc::now().to_rfc3339()],
        )
        .context("Failed to store vault value")?;
        Ok(token)
    }

    fn tokens_read(&self, tokens: &[String], key: &str) -> Result<HashMap<String, String>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = (1..=tokens.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let sealed: Vec<(String, String)> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(&format!(
                "SELECT token, sealed_value FROM vault WHERE token IN ({})",
                placeholders
            ))?;
            let rows = stmt
                .query_map(params_from_iter(tokens.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        sealed
            .into_iter()
            .map(|(token, sealed_value)| -> Result<(String, String)> {
                let value = open(&sealed_value, key)
                    .with_context(|| format!("Failed to read vault token {}", token))?;
                Ok((token, value))
            })
            .collect()
    }

    fn token_delete(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM vault WHERE token = ?1", params![token])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteVaultStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteVaultStore::new(temp_dir.path().join("vault.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn tokenize_then_read_back() {
        let (store, _dir) = create_test_store();
        let t1 = store.tokenize("a@b.com", "key").unwrap();
        let t2 = store.tokenize("Ada", "key").unwrap();
        assert!(t1.starts_with(TOKEN_PREFIX));
        assert_ne!(t1, t2);

        let values = store
            .tokens_read(&[t1.clone(), t2.clone(), "tk_unknown".to_string()], "key")
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[&t1], "a@b.com");
        assert_eq!(values[&t2], "Ada");
    }

    #[test]
    fn reading_with_wrong_key_fails() {
        let (store, _dir) = create_test_store();
        let token = store.tokenize("a@b.com", "key").unwrap();
        let err = store.tokens_read(&[token], "wrong").unwrap_err();
        assert!(err.to_string().contains("Failed to read vault token"));
    }

    #[test]
    fn deleted_tokens_are_gone() {
        let (store, _dir) = create_test_store();
        let token = store.tokenize("a@b.com", "key").unwrap();
        store.token_delete(&token).unwrap();
        assert!(store.tokens_read(&[token], "key").unwrap().is_empty());
    }

    #[test]
    fn untokenize_maps_names_to_values() {
        let (store, _dir) = create_test_store();
        let token = store.tokenize("a@b.com", "key").unwrap();
        let vault: Arc<dyn VaultStore> = Arc::new(store);

        let tokens = HashMap::from([
            ("email".to_string(), token),
            ("first_name".to_string(), String::new()),
        ]);
        let values = super::super::untokenize(Some(&vault), "key", &tokens).unwrap();
        assert_eq!(values["email"], "a@b.com");
        assert_eq!(values["first_name"], "");
    }
}
