//! Note records held by the record store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::bail_invalid;
use crate::error::Result;

/// Store-assigned record identifier.
///
/// Ids increase monotonically and are never reused, so ordering by id is
/// ordering by append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(id: u64) -> Self {
        RecordId(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// SQLite rowid for this id
    pub(crate) fn as_rowid(self) -> Result<i64> {
        match i64::try_from(self.0) {
            Ok(v) => Ok(v),
            Err(_) => bail_invalid!("record id", self.0),
        }
    }

    pub(crate) fn from_rowid(rowid: i64) -> Self {
        RecordId(rowid.max(0) as u64)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id)
    }
}

/// A note record.
///
/// Everything except `deleted` is fixed at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Reference to the source document (book, chapter, page)
    pub source: String,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Validated input for an append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub source: String,
    pub body: String,
    pub tags: BTreeSet<String>,
}

impl NewRecord {
    /// Validate and normalize ingestion input.
    ///
    /// Tags are trimmed and deduplicated; an empty tag is rejected. An empty
    /// body is allowed and simply indexes no terms.
    pub fn new<S: AsRef<str>>(source: &str, body: &str, tags: &[S]) -> Result<Self> {
        let mut tag_set = BTreeSet::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if tag.is_empty() {
                bail_invalid!("tag", "empty tag");
            }
            tag_set.insert(tag.to_string());
        }

        Ok(NewRecord {
            source: source.to_string(),
            body: body.to_string(),
            tags: tag_set,
        })
    }

    /// Materialize the record once the store has assigned its id
    pub fn into_record(self, id: RecordId, created_at: DateTime<Utc>) -> Record {
        Record {
            id,
            source: self.source,
            body: self.body,
            tags: self.tags,
            created_at,
            deleted: false,
        }
    }
}
