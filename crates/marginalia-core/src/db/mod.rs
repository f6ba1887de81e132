//! SQLite-backed record store for marginalia
//!
//! The store is the source of truth. It holds two connections: a writer that
//! serializes appends, tombstones and purges, and a reader for point lookups.
//! In WAL mode the reader never waits on the writer.

mod purge;
mod records;
mod schema;

use crate::config::StorageConfig;
use crate::error::{MarginaliaError, Result};
use crate::map_db_err;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub use purge::PurgeOutcome;
pub use records::LiveScan;
pub use schema::{create_schema, SchemaCreateResult, CURRENT_SCHEMA_VERSION};

/// File name of the record store inside the notebook root
pub const DB_FILE: &str = "marginalia.db";

/// Counts reported by [`RecordStore::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub live_records: u64,
    pub tombstoned_records: u64,
    pub size_bytes: u64,
}

impl StoreStats {
    /// Fraction of stored rows that carry a tombstone
    pub fn tombstone_ratio(&self) -> f64 {
        let total = self.live_records + self.tombstoned_records;
        if total == 0 {
            0.0
        } else {
            self.tombstoned_records as f64 / total as f64
        }
    }
}

/// Durable append-only record log
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    config: StorageConfig,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl RecordStore {
    /// Open or create the record store at `db_path`
    #[tracing::instrument(skip(config), fields(path = %db_path.display()))]
    pub fn open(db_path: &Path, config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Self::open_connection(db_path, config)?;

        match create_schema(&writer).map_err(|e| map_db_err!("create schema", e))? {
            SchemaCreateResult::Newer(v) => {
                return Err(MarginaliaError::InvalidStore {
                    reason: format!(
                        "schema version {} is newer than supported version {}",
                        v, CURRENT_SCHEMA_VERSION
                    ),
                });
            }
            SchemaCreateResult::Created | SchemaCreateResult::Current => {}
        }

        if let Some(max_bytes) = config.max_size_bytes {
            Self::apply_size_quota(&writer, max_bytes)?;
        }

        let reader = Self::open_connection(db_path, config)?;
        reader
            .pragma_update(None, "query_only", "ON")
            .map_err(|e| map_db_err!("configure reader", e))?;

        Ok(RecordStore {
            path: db_path.to_path_buf(),
            config: config.clone(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn open_connection(db_path: &Path, config: &StorageConfig) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| {
            MarginaliaError::Other(format!(
                "failed to open database at {}: {}",
                db_path.display(),
                e
            ))
        })?;

        // Only takes effect before the first page is written, so it must
        // precede the switch to WAL; existing stores keep their mode
        conn.execute_batch("PRAGMA auto_vacuum = INCREMENTAL")
            .map_err(|e| map_db_err!("enable incremental vacuum", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| map_db_err!("enable WAL mode", e))?;
        conn.pragma_update(None, "synchronous", config.synchronous.as_pragma())
            .map_err(|e| map_db_err!("set synchronous mode", e))?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| map_db_err!("set busy timeout", e))?;

        Ok(conn)
    }

    /// Cap the database file so writes past the quota fail with `SQLITE_FULL`
    fn apply_size_quota(conn: &Connection, max_bytes: u64) -> Result<()> {
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |r| r.get(0))
            .map_err(|e| map_db_err!("read page size", e))?;
        let page_size = page_size.max(1) as u64;
        let max_pages = max_bytes.div_ceil(page_size).max(1);

        // SQLite never lowers the cap below the current page count
        let applied: i64 = conn
            .query_row(&format!("PRAGMA max_page_count = {}", max_pages), [], |r| {
                r.get(0)
            })
            .map_err(|e| map_db_err!("set size quota", e))?;

        tracing::debug!(max_bytes, max_pages, applied, "Applied storage quota");
        Ok(())
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a separate connection for long scans (compaction, rebuild)
    pub(crate) fn open_scan_connection(&self) -> Result<Connection> {
        let conn = Self::open_connection(&self.path, &self.config)?;
        conn.pragma_update(None, "query_only", "ON")
            .map_err(|e| map_db_err!("configure scan connection", e))?;
        Ok(conn)
    }

    /// Live and tombstoned counts plus bytes on disk
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.reader.lock();
        let (live, tombstoned): (i64, i64) = conn
            .query_row(
                "SELECT COALESCE(SUM(deleted = 0), 0), COALESCE(SUM(deleted = 1), 0) FROM records",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .map_err(|e| map_db_err!("count records", e))?;
        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |r| r.get(0))
            .map_err(|e| map_db_err!("read page count", e))?;
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |r| r.get(0))
            .map_err(|e| map_db_err!("read page size", e))?;

        Ok(StoreStats {
            live_records: live.max(0) as u64,
            tombstoned_records: tombstoned.max(0) as u64,
            size_bytes: (page_count.max(0) as u64) * (page_size.max(0) as u64),
        })
    }

    pub fn get_schema_version(&self) -> Result<i32> {
        self.reader
            .lock()
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'schema_version'",
                [],
                |r| {
                    let s: String = r.get(0)?;
                    Ok(s.parse().unwrap_or(0))
                },
            )
            .map_err(|e| map_db_err!("get schema version", e))
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        // Fold the WAL back into the main file so the next open starts clean
        let _ = self
            .writer
            .get_mut()
            .pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }
}

#[cfg(test)]
mod tests;
