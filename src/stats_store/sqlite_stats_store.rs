use super::{StatsStore, Visitor, VisitorQuery};
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_db, SqlType, Table, VersionedSchema};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const VISITORS_TABLE_V1: Table = Table {
    name: "visitors",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("ip_address", &SqlType::Text, non_null = true),
        sqlite_column!("user_agent", &SqlType::Text, non_null = true),
        sqlite_column!("referrer", &SqlType::Text, non_null = true),
        sqlite_column!(
            "country",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'empty'")
        ),
        sqlite_column!("user_os", &SqlType::Text, non_null = true),
        sqlite_column!("user_os_version", &SqlType::Text, non_null = true),
        sqlite_column!("user_device", &SqlType::Text, non_null = true),
        sqlite_column!("user_device_type", &SqlType::Text, non_null = true),
        sqlite_column!("user_browser", &SqlType::Text, non_null = true),
        sqlite_column!("user_browser_version", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_visitors_country", "country")],
};

pub const STATS_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[VISITORS_TABLE_V1],
    migration: None,
}];

pub struct SqliteStatsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatsStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), "stats", STATS_STORE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn row_to_visitor(row: &rusqlite::Row) -> rusqlite::Result<Visitor> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now())
        };
        Ok(Visitor {
            id: row.get("id")?,
            path: row.get("path")?,
            ip_address: row.get("ip_address")?,
            user_agent: row.get("user_agent")?,
            referrer: row.get("referrer")?,
            country: row.get("country")?,
            user_os: row.get("user_os")?,
            user_os_version: row.get("user_os_version")?,
            user_device: row.get("user_device")?,
            user_device_type: row.get("user_device_type")?,
            user_browser: row.get("user_browser")?,
            user_browser_version: row.get("user_browser_version")?,
            created_at: parse(&created_at),
            updated_at: parse(&updated_at),
        })
    }
}

impl StatsStore for SqliteStatsStore {
    fn visitor_create(&self, visitor: &Visitor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO visitors (id, path, ip_address, user_agent, referrer, country, user_os,
                user_os_version, user_device, user_device_type, user_browser, user_browser_version,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                visitor.id,
                visitor.path,
                visitor.ip_address,
                visitor.user_agent,
                visitor.referrer,
                visitor.country,
                visitor.user_os,
                visitor.user_os_version,
                visitor.user_device,
                visitor.user_device_type,
                visitor.user_browser,
                visitor.user_browser_version,
                Self::format_datetime(&visitor.created_at),
                Self::format_datetime(&visitor.updated_at),
            ],
        )
        .with_context(|| format!("Failed to create visitor {}", visitor.id))?;
        Ok(())
    }

    fn visitor_find_by_id(&self, id: &str) -> Result<Option<Visitor>> {
        let conn = self.conn.lock().unwrap();
        let visitor = conn
            .query_row(
                "SELECT * FROM visitors WHERE id = ?1",
                params![id],
                Self::row_to_visitor,
            )
            .optional()?;
        Ok(visitor)
    }

    fn visitor_list(&self, query: &VisitorQuery) -> Result<Vec<Visitor>> {
        let mut sql = "SELECT * FROM visitors".to_string();
        let mut values = Vec::new();
        if let Some(country) = &query.country {
            sql.push_str(" WHERE country = ?1");
            values.push(country.clone());
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let visitors = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_visitor)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(visitors)
    }

    fn visitor_update(&self, visitor: &Visitor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE visitors SET path = ?1, ip_address = ?2, user_agent = ?3, referrer = ?4,
                country = ?5, user_os = ?6, user_os_version = ?7, user_device = ?8,
                user_device_type = ?9, user_browser = ?10, user_browser_version = ?11,
                updated_at = ?12
             WHERE id = ?13",
            params![
                visitor.path,
                visitor.ip_address,
                visitor.user_agent,
                visitor.referrer,
                visitor.country,
                visitor.user_os,
                visitor.user_os_version,
                visitor.user_device,
                visitor.user_device_type,
                visitor.user_browser,
                visitor.user_browser_version,
                Self::format_datetime(&Utc::now()),
                visitor.id,
            ],
        )?;
        if updated == 0 {
            bail!("Visitor not found: {}", visitor.id);
        }
        Ok(())
    }
}
