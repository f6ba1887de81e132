//! Sorted posting lists and linear-time merges

use crate::record::RecordId;

/// Record ids for one term or tag, ascending and free of duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    ids: Vec<RecordId>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an id, keeping the list sorted.
    ///
    /// Appends arrive in id order, so the common case is a push.
    pub fn insert(&mut self, id: RecordId) {
        match self.ids.last() {
            None => self.ids.push(id),
            Some(&last) if last < id => self.ids.push(id),
            Some(_) => {
                if let Err(pos) = self.ids.binary_search(&id) {
                    self.ids.insert(pos, id);
                }
            }
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[RecordId] {
        &self.ids
    }
}

/// Ids present in both sorted inputs
pub fn intersect(a: &[RecordId], b: &[RecordId]) -> Vec<RecordId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Ids present in either sorted input, sorted and deduplicated
pub fn union(a: &[RecordId], b: &[RecordId]) -> Vec<RecordId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}
