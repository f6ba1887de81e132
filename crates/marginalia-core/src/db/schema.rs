//! SQLite schema for the record store

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Outcome of schema creation on open
#[derive(Debug, PartialEq, Eq)]
pub enum SchemaCreateResult {
    /// Fresh database, schema written
    Created,
    /// Existing database already at the current version
    Current,
    /// Existing database written by a newer release
    Newer(i32),
}

const SCHEMA_SQL: &str = r#"
-- Append-only note log; rows only change to set the tombstone
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    body TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_records_deleted ON records(deleted);

-- Store metadata
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
"#;

fn read_schema_version(conn: &Connection) -> Option<i32> {
    conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version'",
        [],
        |r| r.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
    )
    .ok()
}

pub fn create_schema(conn: &Connection) -> Result<SchemaCreateResult> {
    let result = match read_schema_version(conn) {
        None => {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                [&CURRENT_SCHEMA_VERSION.to_string()],
            )?;
            tracing::info!(version = CURRENT_SCHEMA_VERSION, "Created record store schema");
            SchemaCreateResult::Created
        }
        Some(v) if v > CURRENT_SCHEMA_VERSION => SchemaCreateResult::Newer(v),
        Some(_) => {
            // Idempotent; fills in anything an older build did not create
            conn.execute_batch(SCHEMA_SQL)?;
            SchemaCreateResult::Current
        }
    };

    Ok(result)
}

#[cfg(test)]
pub fn force_set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('schema_version', ?1)",
        [&version.to_string()],
    )?;
    Ok(())
}
