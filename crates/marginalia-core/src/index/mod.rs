//! In-memory inverted index over record bodies and tags
//!
//! The index is derived data: everything in it can be rebuilt from the record
//! store. Deletion is lazy. `unindex` flips the record's entry in the document
//! table to stale and leaves its posting entries in place; readers resolve
//! every posting entry against the document table, and compaction rebuilds the
//! postings without the stale ids.
//!
//! Readers never see an `InvertedIndex` being mutated: the notebook publishes
//! immutable [`IndexSnapshot`] versions and writers derive the next one.

mod builder;
pub mod posting;
mod snapshot;
mod validation;

use crate::record::{Record, RecordId};
use crate::text::{tag_key, tokenize_with_stemming};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub use builder::IndexBuilder;
pub use posting::PostingList;
pub use snapshot::IndexSnapshot;

/// Visibility of an indexed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    Live,
    /// Tombstoned in the store; postings still reference it until compaction
    Stale,
}

/// Document table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocEntry {
    pub created_at: DateTime<Utc>,
    pub state: DocState,
}

/// Summary counts for an index snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndexStats {
    pub terms: usize,
    pub tags: usize,
    pub live_docs: usize,
    pub stale_docs: usize,
}

impl IndexStats {
    /// Fraction of indexed documents that are stale
    pub fn stale_ratio(&self) -> f64 {
        let total = self.live_docs + self.stale_docs;
        if total == 0 {
            0.0
        } else {
            self.stale_docs as f64 / total as f64
        }
    }
}

/// Term and tag postings plus the document table that validates them
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    terms: HashMap<String, PostingList>,
    tags: HashMap<String, PostingList>,
    docs: HashMap<RecordId, DocEntry>,
    stale: usize,
    stemming: bool,
}

impl InvertedIndex {
    pub fn new(stemming: bool) -> Self {
        InvertedIndex {
            stemming,
            ..Default::default()
        }
    }

    /// Add a record's body terms and tags.
    ///
    /// Tombstoned records and records already indexed are ignored.
    pub fn index(&mut self, record: &Record) {
        if record.deleted || self.docs.contains_key(&record.id) {
            return;
        }

        let mut seen = HashSet::new();
        for term in tokenize_with_stemming(&record.body, self.stemming) {
            if seen.insert(term.clone()) {
                self.terms.entry(term).or_default().insert(record.id);
            }
        }

        for tag in &record.tags {
            let key = tag_key(tag);
            if key.is_empty() {
                continue;
            }
            self.tags.entry(key).or_default().insert(record.id);
        }

        self.docs.insert(
            record.id,
            DocEntry {
                created_at: record.created_at,
                state: DocState::Live,
            },
        );
    }

    /// Hide a record from all future reads.
    ///
    /// Returns false when the id was not live in this index.
    pub fn unindex(&mut self, id: RecordId) -> bool {
        match self.docs.get_mut(&id) {
            Some(entry) if entry.state == DocState::Live => {
                entry.state = DocState::Stale;
                self.stale += 1;
                true
            }
            _ => false,
        }
    }

    /// Validity check applied to every posting entry at read time
    pub fn is_live(&self, id: RecordId) -> bool {
        matches!(
            self.docs.get(&id),
            Some(DocEntry {
                state: DocState::Live,
                ..
            })
        )
    }

    pub fn doc(&self, id: RecordId) -> Option<&DocEntry> {
        self.docs.get(&id)
    }

    /// Raw posting entries for a normalized term; may include stale ids
    pub fn term_postings(&self, term: &str) -> &[RecordId] {
        self.terms
            .get(term)
            .map(PostingList::as_slice)
            .unwrap_or(&[])
    }

    /// Raw posting entries for a tag (case-insensitive); may include stale ids
    pub fn tag_postings(&self, tag: &str) -> &[RecordId] {
        self.tags
            .get(&tag_key(tag))
            .map(PostingList::as_slice)
            .unwrap_or(&[])
    }

    /// Normalize query text exactly as bodies are normalized at index time.
    ///
    /// Duplicates are dropped; first occurrence order is kept.
    pub fn terms_for(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        tokenize_with_stemming(text, self.stemming)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            terms: self.terms.len(),
            tags: self.tags.len(),
            live_docs: self.docs.len() - self.stale,
            stale_docs: self.stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[test]
    fn test_index_body_terms_and_tags() {
        let mut index = InvertedIndex::new(false);
        index.index(&record(1, "Channels are simple to learn", &["Go"]));
        index.index(&record(2, "goroutines and channels", &["go", "concurrency"]));

        assert_eq!(
            index.term_postings("channels"),
            &[RecordId::new(1), RecordId::new(2)]
        );
        assert_eq!(index.term_postings("simple"), &[RecordId::new(1)]);
        assert_eq!(index.tag_postings("GO"), &[RecordId::new(1), RecordId::new(2)]);
        assert!(index.term_postings("missing").is_empty());
        assert_eq!(index.stats().live_docs, 2);
    }

    #[test]
    fn test_repeated_terms_post_once() {
        let mut index = InvertedIndex::new(false);
        index.index(&record(1, "ring ring ring", &[]));
        assert_eq!(index.term_postings("ring"), &[RecordId::new(1)]);
    }

    #[test]
    fn test_index_is_idempotent_and_skips_tombstones() {
        let mut index = InvertedIndex::new(false);
        let rec = record(1, "body", &[]);
        index.index(&rec);
        index.index(&rec);
        assert_eq!(index.term_postings("body").len(), 1);

        let mut dead = record(2, "body", &[]);
        dead.deleted = true;
        index.index(&dead);
        assert_eq!(index.term_postings("body").len(), 1);
        assert!(index.doc(RecordId::new(2)).is_none());
    }

    #[test]
    fn test_unindex_is_lazy() {
        let mut index = InvertedIndex::new(false);
        index.index(&record(1, "lazy deletion", &["gc"]));

        assert!(index.unindex(RecordId::new(1)));
        assert!(!index.unindex(RecordId::new(1)));
        assert!(!index.unindex(RecordId::new(77)));

        // Entry stays in the posting list but fails the validity check
        assert_eq!(index.term_postings("lazy"), &[RecordId::new(1)]);
        assert!(!index.is_live(RecordId::new(1)));

        let stats = index.stats();
        assert_eq!(stats.live_docs, 0);
        assert_eq!(stats.stale_docs, 1);
        assert_eq!(stats.stale_ratio(), 1.0);
    }

    #[test]
    fn test_stemming_applies_to_queries_too() {
        let mut index = InvertedIndex::new(true);
        index.index(&record(1, "buffered channels", &[]));
        let terms = index.terms_for("Channel");
        assert_eq!(terms, vec!["channel"]);
        assert_eq!(index.term_postings(&terms[0]), &[RecordId::new(1)]);
    }

    #[test]
    fn test_terms_for_dedups() {
        let index = InvertedIndex::new(false);
        assert_eq!(index.terms_for("go Go GO-routines"), vec!["go", "routines"]);
        assert!(index.terms_for("--").is_empty());
    }
}
