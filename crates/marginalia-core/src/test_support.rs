//! Shared fixtures for unit tests

use crate::record::{NewRecord, Record, RecordId};
use chrono::{TimeZone, Utc};

/// A live record whose `created_at` grows with its id
pub(crate) fn record(id: u64, body: &str, tags: &[&str]) -> Record {
    NewRecord::new("test source", body, tags)
        .unwrap()
        .into_record(
            RecordId::new(id),
            Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
        )
}

/// Shorthand for a list of ids
pub(crate) fn ids(v: &[u64]) -> Vec<RecordId> {
    v.iter().copied().map(RecordId::new).collect()
}
