//! Physical reclamation of tombstoned records
//!
//! Both purging and space reclamation work in bounded steps and release the
//! writer between them, so appends and deletes interleave with a long purge.

use super::RecordStore;
use crate::error::{MarginaliaError, Result};
use crate::map_db_err;
use crate::record::RecordId;
use rusqlite::Connection;
use std::thread;

/// Tombstoned rows removed per purge transaction
const PURGE_BATCH_ROWS: usize = 512;

/// `PRAGMA auto_vacuum` value for incremental mode
const AUTO_VACUUM_INCREMENTAL: i64 = 2;

/// Result of [`RecordStore::purge_tombstones`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// Ids whose rows were removed, ascending
    pub purged: Vec<RecordId>,
}

fn free_pages(conn: &Connection) -> Result<u64> {
    let free: i64 = conn
        .query_row("PRAGMA freelist_count", [], |r| r.get(0))
        .map_err(|e| map_db_err!("read freelist", e))?;
    Ok(free.max(0) as u64)
}

fn incremental_vacuum(conn: &Connection, pages: u32) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA incremental_vacuum({})", pages))
        .map_err(|e| map_db_err!("prepare incremental vacuum", e))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| map_db_err!("incremental vacuum", e))?;
    // The pragma does its work as the statement is stepped to completion
    while rows
        .next()
        .map_err(|e| map_db_err!("incremental vacuum", e))?
        .is_some()
    {}
    Ok(())
}

impl RecordStore {
    /// Delete every tombstoned row.
    ///
    /// Rows go in batches, each its own transaction, with the writer released
    /// in between. A failure leaves earlier batches purged; the remaining
    /// tombstones are still hidden and go on the next run.
    #[tracing::instrument(skip(self))]
    pub fn purge_tombstones(&self) -> Result<PurgeOutcome> {
        let mut purged = Vec::new();
        loop {
            let batch = self.purge_batch()?;
            if batch.is_empty() {
                break;
            }
            purged.extend(batch);
            thread::yield_now();
        }

        purged.sort_unstable();
        tracing::info!(purged = purged.len(), "Purged tombstoned records");
        Ok(PurgeOutcome { purged })
    }

    fn purge_batch(&self) -> Result<Vec<RecordId>> {
        let mut conn = self.writer.lock();
        let tx = conn
            .transaction()
            .map_err(|e| MarginaliaError::transaction("start purge", e))?;

        let ids = {
            let mut stmt = tx
                .prepare(
                    "DELETE FROM records WHERE id IN \
                     (SELECT id FROM records WHERE deleted = 1 ORDER BY id LIMIT ?1) \
                     RETURNING id",
                )
                .map_err(|e| map_db_err!("prepare purge", e))?;
            let ids = stmt
                .query_map([PURGE_BATCH_ROWS as i64], |r| r.get::<_, i64>(0))
                .map_err(|e| map_db_err!("purge tombstones", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| map_db_err!("read purged id", e))?;
            ids
        };

        tx.commit()
            .map_err(|e| MarginaliaError::transaction("commit purge", e))?;
        Ok(ids.into_iter().map(RecordId::from_rowid).collect())
    }

    /// Return free pages to the filesystem, `step_pages` at a time.
    ///
    /// The writer is released between steps. Returns the pages released, or
    /// `None` when the store was created without incremental auto-vacuum and
    /// cannot shrink this way.
    #[tracing::instrument(skip(self))]
    pub fn reclaim_space(&self, step_pages: u32) -> Result<Option<u64>> {
        let step = step_pages.max(1);
        {
            let conn = self.writer.lock();
            let mode: i64 = conn
                .query_row("PRAGMA auto_vacuum", [], |r| r.get(0))
                .map_err(|e| map_db_err!("read auto_vacuum mode", e))?;
            if mode != AUTO_VACUUM_INCREMENTAL {
                tracing::debug!(mode, "Store does not support incremental vacuum");
                return Ok(None);
            }
        }

        let mut released = 0;
        loop {
            let (before, after) = {
                let conn = self.writer.lock();
                let before = free_pages(&conn)?;
                if before == 0 {
                    break;
                }
                incremental_vacuum(&conn, step)?;
                (before, free_pages(&conn)?)
            };
            if after >= before {
                break;
            }
            released += before - after;
            thread::yield_now();
        }

        let conn = self.writer.lock();
        conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
            .map_err(|e| map_db_err!("checkpoint after vacuum", e))?;
        tracing::debug!(released, "Reclaimed free pages");
        Ok(Some(released))
    }
}
