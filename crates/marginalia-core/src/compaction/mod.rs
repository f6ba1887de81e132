//! Compaction: purge tombstoned records and rebuild the index without them
//!
//! A rebuild scans the record store through its own connection and builds a
//! fresh index without touching the one readers are using. Tombstoned rows are
//! then purged in batches. Only the final step runs under the notebook's write
//! gate: records appended or deleted since the scan are applied to the new
//! index and it is published in place of the old one. Anything that fails
//! before the swap leaves the previous index in service.

mod run;

use crate::config::CompactionConfig;
use crate::db::{RecordStore, StoreStats};
use crate::error::Result;
use crate::index::{IndexBuilder, InvertedIndex};
use crate::record::RecordId;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Outcome of a compaction or index repair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompactionReport {
    /// Tombstoned rows physically removed from the store
    pub purged_records: usize,
    /// Distinct terms in the new index
    pub rebuilt_terms: usize,
    /// Distinct tags in the new index
    pub rebuilt_tags: usize,
    /// Dangling posting ids found in the replaced index
    pub healed_dangling: usize,
    /// Incremental vacuum ran after the purge
    pub vacuumed: bool,
    /// Free pages returned to the filesystem
    pub reclaimed_pages: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Whether the store carries enough tombstones for compaction to pay off.
///
/// Both the absolute count and the tombstoned fraction of stored rows must
/// reach their thresholds.
pub fn should_compact(stats: &StoreStats, config: &CompactionConfig) -> bool {
    stats.tombstoned_records > 0
        && stats.tombstoned_records >= config.min_tombstones as u64
        && stats.tombstone_ratio() >= config.tombstone_ratio
}

/// A freshly built index and the store snapshot it was built from
pub(crate) struct Rebuild {
    pub index: InvertedIndex,
    pub live: HashSet<RecordId>,
    pub high_water: Option<RecordId>,
}

/// Build an index from a consistent scan of the live records
pub(crate) fn rebuild_from_store(store: &RecordStore, stemming: bool) -> Result<Rebuild> {
    let scan = store.scan_live()?;
    let live = scan.records.iter().map(|r| r.id).collect();
    let index = IndexBuilder::new(stemming).add_all(&scan.records).build();
    Ok(Rebuild {
        index,
        live,
        high_water: scan.high_water,
    })
}
