//! Index consistency checks against the record store

use super::{DocState, InvertedIndex};
use crate::record::RecordId;
use std::collections::{BTreeSet, HashSet};

impl InvertedIndex {
    /// Posting ids that claim to be live but have no live record behind them.
    ///
    /// `store_live` holds the live ids of a store snapshot taken at
    /// `high_water`; ids above it were appended later and are not judged.
    /// Stale entries are expected garbage, not corruption. An id with no
    /// document entry at all is always dangling.
    pub fn dangling_ids(
        &self,
        store_live: &HashSet<RecordId>,
        high_water: Option<RecordId>,
    ) -> Vec<RecordId> {
        let mut dangling = BTreeSet::new();
        let postings = self
            .terms
            .values()
            .chain(self.tags.values())
            .flat_map(|list| list.as_slice().iter().copied());

        for id in postings.chain(self.docs.keys().copied()) {
            if dangling.contains(&id) {
                continue;
            }
            let is_dangling = match self.docs.get(&id) {
                None => true,
                Some(entry) if entry.state == DocState::Stale => false,
                Some(_) => high_water.is_some_and(|hw| id <= hw) && !store_live.contains(&id),
            };
            if is_dangling {
                dangling.insert(id);
            }
        }

        dangling.into_iter().collect()
    }
}
