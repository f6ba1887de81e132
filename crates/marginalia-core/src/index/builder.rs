use super::InvertedIndex;
use crate::record::{Record, RecordId};
use std::time::Instant;

/// Index builder - constructs a fresh index from a record scan
pub struct IndexBuilder {
    index: InvertedIndex,
    high_water: Option<RecordId>,
}

impl IndexBuilder {
    pub fn new(stemming: bool) -> Self {
        IndexBuilder {
            index: InvertedIndex::new(stemming),
            high_water: None,
        }
    }

    /// Index every live record in `records`
    pub fn add_all<'a>(mut self, records: impl IntoIterator<Item = &'a Record>) -> Self {
        for record in records {
            self.add(record);
        }
        self
    }

    pub fn add(&mut self, record: &Record) {
        self.index.index(record);
        self.high_water = self.high_water.max(Some(record.id));
    }

    /// Highest id seen so far
    pub fn high_water(&self) -> Option<RecordId> {
        self.high_water
    }

    #[tracing::instrument(skip(self))]
    pub fn build(self) -> InvertedIndex {
        let start = Instant::now();
        let stats = self.index.stats();
        tracing::debug!(
            terms = stats.terms,
            tags = stats.tags,
            docs = stats.live_docs,
            "Built inverted index"
        );
        crate::trace_time!(start, "build_index");
        self.index
    }
}
