use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

/// Offset added to every schema version before it is written to `PRAGMA user_version`,
/// so that databases created by other tools are never mistaken for ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn parse(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

pub struct Column<'a> {
    pub name: &'static str,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static>],
    /// (index name, column list)
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let columns_sql = self
            .columns
            .iter()
            .map(|column| {
                let mut sql = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    sql.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    sql.push_str(" NOT NULL");
                }
                if column.is_unique {
                    sql.push_str(" UNIQUE");
                }
                if let Some(default_value) = column.default_value {
                    sql.push_str(&format!(" DEFAULT {}", default_value));
                }
                sql
            })
            .collect::<Vec<_>>()
            .join(", ");

        conn.execute(
            &format!("CREATE TABLE {} ({});", self.name, columns_sql),
            params![],
        )
        .with_context(|| format!("Failed to create table {}", self.name))?;

        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        struct ActualColumn {
            name: String,
            sql_type: String,
            non_null: bool,
            default_value: Option<String>,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns = stmt
            .query_map(params![], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if actual_columns.is_empty() {
            bail!("Table {} does not exist", self.name);
        }

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if SqlType::parse(&actual.sql_type) != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // SQLite may report default values wrapped in parentheses
            let actual_default = actual.default_value.as_deref().map(strip_parentheses);
            let expected_default = expected.default_value.map(strip_parentheses);
            if actual_default != expected_default {
                bail!(
                    "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }

        for (index_name, _) in self.indices {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

fn strip_parentheses(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Opens (or creates) a database and brings it to the latest schema in `schemas`.
///
/// A fresh file gets the latest schema created directly. An existing file must carry a
/// known version whose schema validates; pending migrations then run in one transaction.
pub fn open_versioned_db(
    path: &std::path::Path,
    label: &str,
    schemas: &'static [VersionedSchema],
) -> Result<Connection> {
    let is_new_db = !path.exists();
    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open {} database at {:?}", label, path))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    let latest = schemas
        .last()
        .with_context(|| format!("No schema declared for {} database", label))?;

    if is_new_db {
        tracing::info!("Creating new {} database at {:?}", label, path);
        latest.create(&conn)?;
        return Ok(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 1 {
        bail!(
            "{} database version {} is invalid (expected >= 1)",
            label,
            db_version
        );
    }

    let schema = schemas
        .iter()
        .find(|s| s.version == db_version as usize)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?;
    schema.validate(&conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            label, db_version
        )
    })?;

    if (db_version as usize) < latest.version {
        tracing::info!(
            "Migrating {} database from version {} to {}",
            label,
            db_version,
            latest.version
        );
        let tx = conn.transaction()?;
        let start = db_version as usize;
        let mut current = start;
        for schema in schemas.iter().filter(|s| s.version > start) {
            if let Some(migration) = schema.migration {
                migration(&tx).with_context(|| {
                    format!("Failed to run {} migration to version {}", label, schema.version)
                })?;
            }
            current = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + current),
            [],
        )?;
        tx.commit()?;
    }

    Ok(conn)
}
