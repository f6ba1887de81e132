use super::format_timestamp;
use crate::db::RecordStore;
use crate::error::{MarginaliaError, Result};
use crate::map_db_err;
use crate::record::{NewRecord, Record, RecordId};
use chrono::Utc;
use rusqlite::params;
use std::time::Instant;

impl RecordStore {
    /// Append a record and return it with its assigned id.
    ///
    /// The insert commits before this returns; with `synchronous = FULL` the
    /// commit is fsynced.
    pub fn append(&self, new: NewRecord) -> Result<Record> {
        let start = Instant::now();
        let created_at = Utc::now();
        let tags_json = serde_json::to_string(&new.tags)?;

        let mut conn = self.writer.lock();
        let tx = conn
            .transaction()
            .map_err(|e| MarginaliaError::transaction("start append", e))?;

        tx.execute(
            "INSERT INTO records (source, body, tags, created_at, deleted) VALUES (?1, ?2, ?3, ?4, 0)",
            params![new.source, new.body, tags_json, format_timestamp(&created_at)],
        )
        .map_err(|e| map_db_err!("append record", e))?;
        let id = RecordId::from_rowid(tx.last_insert_rowid());

        tx.commit()
            .map_err(|e| MarginaliaError::transaction("commit append", e))?;
        drop(conn);

        crate::trace_time!(start, "append_record", record_id = id.get());
        Ok(new.into_record(id, created_at))
    }

    /// Set the tombstone on a live record.
    ///
    /// Returns `NotFound` for unknown ids and for ids already deleted.
    pub fn delete(&self, id: RecordId) -> Result<()> {
        let rowid = id.as_rowid()?;
        let conn = self.writer.lock();
        let changed = conn
            .execute(
                "UPDATE records SET deleted = 1, deleted_at = ?2 WHERE id = ?1 AND deleted = 0",
                params![rowid, format_timestamp(&Utc::now())],
            )
            .map_err(|e| map_db_err!("tombstone record", e))?;

        if changed == 0 {
            return Err(MarginaliaError::NotFound { id });
        }

        tracing::debug!(record_id = id.get(), "Tombstoned record");
        Ok(())
    }
}
