mod append;
mod read;

pub use read::LiveScan;

use crate::error::{MarginaliaError, Result};
use crate::record::{Record, RecordId};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeSet;

/// Columns selected for every record read, in `RawRecordRow` order
pub(crate) const RECORD_COLUMNS: &str = "id, source, body, tags, created_at, deleted";

/// A `records` row before its text columns are decoded
struct RawRecordRow {
    id: i64,
    source: String,
    body: String,
    tags_json: String,
    created_at: String,
    deleted: bool,
}

impl RawRecordRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(RawRecordRow {
            id: row.get(0)?,
            source: row.get(1)?,
            body: row.get(2)?,
            tags_json: row.get(3)?,
            created_at: row.get(4)?,
            deleted: row.get::<_, i64>(5)? != 0,
        })
    }

    fn into_record(self) -> Result<Record> {
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags_json)?;
        let created_at = parse_timestamp(&self.created_at)?;
        Ok(Record {
            id: RecordId::from_rowid(self.id),
            source: self.source,
            body: self.body,
            tags,
            created_at,
            deleted: self.deleted,
        })
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MarginaliaError::FailedOperation {
            operation: format!("parse timestamp '{}'", s),
            reason: e.to_string(),
        })
}
