use super::{RawRecordRow, RECORD_COLUMNS};
use crate::db::RecordStore;
use crate::error::{MarginaliaError, Result};
use crate::map_db_err;
use crate::record::{Record, RecordId};
use rusqlite::{params, Connection};

fn query_records(conn: &Connection, sql: &str, after: i64) -> Result<Vec<Record>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| map_db_err!("prepare record scan", e))?;
    let rows = stmt
        .query_map(params![after], RawRecordRow::from_row)
        .map_err(|e| map_db_err!("scan records", e))?;

    let mut records = Vec::new();
    for row in rows {
        let raw = row.map_err(|e| map_db_err!("read record row", e))?;
        records.push(raw.into_record()?);
    }
    Ok(records)
}

/// Live records plus the highest id assigned when the snapshot was taken
#[derive(Debug, Clone)]
pub struct LiveScan {
    pub records: Vec<Record>,
    pub high_water: Option<RecordId>,
}

fn read_sequence(conn: &Connection) -> Result<Option<RecordId>> {
    let seq = conn.query_row(
        "SELECT seq FROM sqlite_sequence WHERE name = 'records'",
        [],
        |r| r.get::<_, i64>(0),
    );
    match seq {
        Ok(seq) => Ok(Some(RecordId::from_rowid(seq))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(map_db_err!("read id sequence", e)),
    }
}

impl RecordStore {
    /// Fetch a live record
    pub fn get(&self, id: RecordId) -> Result<Record> {
        match self.get_including_deleted(id)? {
            Some(record) if record.is_live() => Ok(record),
            _ => Err(MarginaliaError::NotFound { id }),
        }
    }

    /// Fetch a record regardless of its tombstone
    pub fn get_including_deleted(&self, id: RecordId) -> Result<Option<Record>> {
        let rowid = id.as_rowid()?;
        let conn = self.reader.lock();
        let row = conn.query_row(
            &format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS),
            params![rowid],
            RawRecordRow::from_row,
        );

        match row {
            Ok(raw) => raw.into_record().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_db_err!("read record", e)),
        }
    }

    /// Consistent snapshot of all live records in id order.
    ///
    /// Runs inside one read transaction on a dedicated connection, so the
    /// records and the high-water mark describe the same instant and the scan
    /// neither holds the reader nor blocks the writer.
    #[tracing::instrument(skip(self))]
    pub fn scan_live(&self) -> Result<LiveScan> {
        let conn = self.open_scan_connection()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| MarginaliaError::transaction("start scan", e))?;

        let high_water = read_sequence(&tx)?;
        let records = match high_water {
            Some(hw) => query_records(
                &tx,
                &format!(
                    "SELECT {} FROM records WHERE deleted = 0 AND id <= ?1 ORDER BY id",
                    RECORD_COLUMNS
                ),
                hw.as_rowid()?,
            )?,
            None => Vec::new(),
        };

        tx.commit()
            .map_err(|e| MarginaliaError::transaction("finish scan", e))?;
        Ok(LiveScan {
            records,
            high_water,
        })
    }

    /// Live records appended after `after`, in id order
    pub fn scan_live_after(&self, after: Option<RecordId>) -> Result<Vec<Record>> {
        let after = match after {
            Some(id) => id.as_rowid()?,
            None => 0,
        };
        let conn = self.writer.lock();
        query_records(
            &conn,
            &format!(
                "SELECT {} FROM records WHERE deleted = 0 AND id > ?1 ORDER BY id",
                RECORD_COLUMNS
            ),
            after,
        )
    }

    /// Ids currently carrying a tombstone
    pub fn tombstoned_ids(&self) -> Result<Vec<RecordId>> {
        let conn = self.reader.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM records WHERE deleted = 1 ORDER BY id")
            .map_err(|e| map_db_err!("prepare tombstone scan", e))?;
        let ids = stmt
            .query_map([], |r| r.get::<_, i64>(0))
            .map_err(|e| map_db_err!("scan tombstones", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| map_db_err!("read tombstone row", e))?;
        Ok(ids.into_iter().map(RecordId::from_rowid).collect())
    }
}
