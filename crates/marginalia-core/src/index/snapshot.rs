//! Immutable index versions shared between the writer and readers
//!
//! A snapshot is a large base index plus a small delta holding records
//! appended and tombstoned since the base was built. Both layers sit behind
//! `Arc`s; a writer derives the next version by copying the delta only, and
//! folds the delta into a fresh base once it grows past a fixed size. Readers
//! keep whatever version they cloned and never wait on a writer.

use super::{DocEntry, DocState, IndexStats, InvertedIndex};
use crate::record::{Record, RecordId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Delta entries (appended docs plus base tombstones) that trigger a fold
const FOLD_THRESHOLD: usize = 512;

/// Changes layered over the base since it was last rebuilt or folded
#[derive(Debug, Clone, Default)]
struct Delta {
    /// Records appended after the base; ids are all above the base's ids
    recent: InvertedIndex,
    /// Base records tombstoned since the base was built
    deleted: HashSet<RecordId>,
}

impl Delta {
    fn len(&self) -> usize {
        self.recent.docs.len() + self.deleted.len()
    }
}

/// One published version of the index
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    base: Arc<InvertedIndex>,
    delta: Arc<Delta>,
}

impl From<InvertedIndex> for IndexSnapshot {
    fn from(base: InvertedIndex) -> Self {
        let delta = Delta {
            recent: InvertedIndex::new(base.stemming),
            deleted: HashSet::new(),
        };
        IndexSnapshot {
            base: Arc::new(base),
            delta: Arc::new(delta),
        }
    }
}

impl IndexSnapshot {
    /// The base layer followed by the delta layer.
    ///
    /// Every id lives in exactly one layer, so a query can be resolved per
    /// layer and the results combined.
    pub fn layers(&self) -> [&InvertedIndex; 2] {
        [self.base.as_ref(), &self.delta.recent]
    }

    /// Add a record to this version.
    ///
    /// Only the delta is copied; versions held by readers are unaffected.
    pub fn index(&mut self, record: &Record) {
        if self.base.docs.contains_key(&record.id) {
            return;
        }
        Arc::make_mut(&mut self.delta).recent.index(record);
        self.maybe_fold();
    }

    /// Hide a record from this version; false when it was not live
    pub fn unindex(&mut self, id: RecordId) -> bool {
        let hidden = if self.delta.recent.is_live(id) {
            Arc::make_mut(&mut self.delta).recent.unindex(id)
        } else if self.base.is_live(id) && !self.delta.deleted.contains(&id) {
            Arc::make_mut(&mut self.delta).deleted.insert(id)
        } else {
            false
        };
        self.maybe_fold();
        hidden
    }

    fn maybe_fold(&mut self) {
        if self.delta.len() < FOLD_THRESHOLD {
            return;
        }
        let delta = std::mem::take(Arc::make_mut(&mut self.delta));
        let base = Arc::make_mut(&mut self.base);
        base.absorb(delta.recent);
        for id in delta.deleted {
            base.unindex(id);
        }
        self.delta = Arc::new(Delta {
            recent: InvertedIndex::new(base.stemming),
            deleted: HashSet::new(),
        });
        tracing::trace!(docs = base.docs.len(), "Folded index delta into base");
    }

    pub fn is_live(&self, id: RecordId) -> bool {
        self.delta.recent.is_live(id)
            || (self.base.is_live(id) && !self.delta.deleted.contains(&id))
    }

    pub fn doc(&self, id: RecordId) -> Option<&DocEntry> {
        self.delta.recent.doc(id).or_else(|| self.base.doc(id))
    }

    /// Ids this version treats as live that the store does not hold live
    pub fn dangling_ids(
        &self,
        store_live: &HashSet<RecordId>,
        high_water: Option<RecordId>,
    ) -> Vec<RecordId> {
        let mut dangling: Vec<RecordId> = self
            .base
            .dangling_ids(store_live, high_water)
            .into_iter()
            .filter(|id| !self.delta.deleted.contains(id))
            .chain(self.delta.recent.dangling_ids(store_live, high_water))
            .collect();
        dangling.sort_unstable();
        dangling.dedup();
        dangling
    }

    /// Narrow dangling candidates found against an older version.
    ///
    /// A candidate this version has already unindexed was a delete still in
    /// flight when the candidates were computed, not corruption.
    pub fn still_dangling(&self, candidates: Vec<RecordId>) -> Vec<RecordId> {
        candidates
            .into_iter()
            .filter(|id| self.is_live(*id) || self.doc(*id).is_none())
            .collect()
    }

    /// Tag keys with their live record counts, most used first
    pub fn tag_counts(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for layer in self.layers() {
            for (tag, list) in &layer.tags {
                let live = list
                    .as_slice()
                    .iter()
                    .filter(|id| self.is_live(**id))
                    .count();
                if live > 0 {
                    *counts.entry(tag.as_str()).or_default() += live;
                }
            }
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(tag, n)| (tag.to_string(), n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    pub fn stats(&self) -> IndexStats {
        let base = self.base.stats();
        let recent = self.delta.recent.stats();
        let deleted = self.delta.deleted.len();
        let new_terms = self
            .delta
            .recent
            .terms
            .keys()
            .filter(|t| !self.base.terms.contains_key(*t))
            .count();
        let new_tags = self
            .delta
            .recent
            .tags
            .keys()
            .filter(|t| !self.base.tags.contains_key(*t))
            .count();
        IndexStats {
            terms: base.terms + new_terms,
            tags: base.tags + new_tags,
            live_docs: base.live_docs + recent.live_docs - deleted,
            stale_docs: base.stale_docs + recent.stale_docs + deleted,
        }
    }
}

impl InvertedIndex {
    /// Merge another index whose ids are all above this one's
    fn absorb(&mut self, other: InvertedIndex) {
        for (term, list) in other.terms {
            let target = self.terms.entry(term).or_default();
            for id in list.as_slice() {
                target.insert(*id);
            }
        }
        for (tag, list) in other.tags {
            let target = self.tags.entry(tag).or_default();
            for id in list.as_slice() {
                target.insert(*id);
            }
        }
        for (id, entry) in other.docs {
            if entry.state == DocState::Stale {
                self.stale += 1;
            }
            self.docs.insert(id, entry);
        }
    }
}
