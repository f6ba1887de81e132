//! The notebook: record store plus the index snapshot readers query
//!
//! One writer, many readers. Appends and deletes pass through a write gate
//! that covers both the durable store write and the matching index update, so
//! readers see either the state before a write or after it. Writers never
//! mutate the index version readers hold: each write derives a new
//! [`IndexSnapshot`] and publishes it. Queries clone the current version and
//! evaluate without holding any lock, so a slow query never delays a writer
//! and compaction can swap in a rebuilt index under queries already in flight.

use crate::compaction::rebuild_from_store;
use crate::config::NotebookConfig;
use crate::db::{RecordStore, StoreStats, DB_FILE};
use crate::error::{MarginaliaError, Result};
use crate::index::{IndexSnapshot, IndexStats};
use crate::logging::QueryStats;
use crate::query::{evaluate, paginate, CancelFlag, Hit, Query, QueryOptions};
use crate::record::{NewRecord, Record, RecordId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Combined store and index counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NotebookStats {
    pub live_records: u64,
    pub tombstoned_records: u64,
    pub size_bytes: u64,
    pub indexed_terms: usize,
    pub indexed_tags: usize,
    /// Index entries hidden by tombstones and awaiting compaction
    pub stale_entries: usize,
}

impl NotebookStats {
    fn new(store: StoreStats, index: IndexStats) -> Self {
        NotebookStats {
            live_records: store.live_records,
            tombstoned_records: store.tombstoned_records,
            size_bytes: store.size_bytes,
            indexed_terms: index.terms,
            indexed_tags: index.tags,
            stale_entries: index.stale_docs,
        }
    }
}

/// A note collection with full-text and tag search
#[derive(Debug)]
pub struct Notebook {
    root: PathBuf,
    config: NotebookConfig,
    pub(crate) store: RecordStore,
    /// Serializes store writes with their index updates and the index swap
    pub(crate) write_gate: Mutex<()>,
    pub(crate) compaction_lock: Mutex<()>,
    /// Published index version; the lock is held only to clone or replace it
    pub(crate) current: RwLock<IndexSnapshot>,
    stats: QueryStats,
}

impl Notebook {
    /// Open or create a notebook, reading `config.toml` from `root` if present
    pub fn open(root: &Path) -> Result<Self> {
        let config = NotebookConfig::load_or_default(root)?;
        Self::open_with_config(root, config)
    }

    /// Open or create a notebook with explicit configuration.
    ///
    /// The index is rebuilt from the record store on every open.
    #[tracing::instrument(skip(root, config), fields(root = %root.display()))]
    pub fn open_with_config(root: &Path, config: NotebookConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(root)?;

        let start = Instant::now();
        let store = RecordStore::open(&root.join(DB_FILE), &config.storage)?;
        let rebuild = rebuild_from_store(&store, config.index.stemming)?;
        let stats = rebuild.index.stats();
        tracing::info!(
            live = stats.live_docs,
            terms = stats.terms,
            tags = stats.tags,
            "Opened notebook"
        );
        crate::trace_time!(start, "open_notebook");

        Ok(Notebook {
            root: root.to_path_buf(),
            config,
            store,
            write_gate: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            current: RwLock::new(IndexSnapshot::from(rebuild.index)),
            stats: QueryStats::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &NotebookConfig {
        &self.config
    }

    /// The underlying record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Query counters accumulated since open
    pub fn query_stats(&self) -> &QueryStats {
        &self.stats
    }

    /// The index version new queries should use
    pub(crate) fn snapshot(&self) -> IndexSnapshot {
        self.current.read().clone()
    }

    /// Derive the next index version from the current one and publish it.
    ///
    /// Callers hold the write gate.
    pub(crate) fn publish<T>(&self, change: impl FnOnce(&mut IndexSnapshot) -> T) -> T {
        let mut next = self.snapshot();
        let out = change(&mut next);
        *self.current.write() = next;
        out
    }

    /// Durably append a note and index it.
    ///
    /// The record is committed before this returns; it is visible to queries
    /// from the same moment.
    pub fn append<S: AsRef<str>>(&self, source: &str, body: &str, tags: &[S]) -> Result<RecordId> {
        let new = NewRecord::new(source, body, tags)?;

        let _gate = self.write_gate.lock();
        let record = self.store.append(new)?;
        self.publish(|next| next.index(&record));
        Ok(record.id)
    }

    /// Fetch a live record
    pub fn get(&self, id: RecordId) -> Result<Record> {
        self.store.get(id)
    }

    /// Tombstone a record and hide it from queries.
    ///
    /// The row stays on disk until the next compaction.
    pub fn delete(&self, id: RecordId) -> Result<()> {
        let _gate = self.write_gate.lock();
        self.store.delete(id)?;
        if !self.publish(|next| next.unindex(id)) {
            tracing::warn!(id = id.get(), "Deleted record was not live in the index");
        }
        Ok(())
    }

    /// Matching record ids, newest first
    pub fn query_ids(&self, query: &Query, options: &QueryOptions) -> Result<Vec<RecordId>> {
        self.query_ids_cancellable(query, options, &CancelFlag::new())
    }

    pub fn query_ids_cancellable(
        &self,
        query: &Query,
        options: &QueryOptions,
        cancel: &CancelFlag,
    ) -> Result<Vec<RecordId>> {
        let ids = self.evaluate(query, cancel)?;
        Ok(paginate(ids, options, self.config.query.default_limit))
    }

    /// Matching records, newest first
    pub fn search(&self, query: &Query, options: &QueryOptions) -> Result<Vec<Hit>> {
        self.search_cancellable(query, options, &CancelFlag::new())
    }

    /// Parse `text` with [`Query::parse`] and search
    pub fn search_text(&self, text: &str, options: &QueryOptions) -> Result<Vec<Hit>> {
        self.search(&Query::parse(text)?, options)
    }

    /// Matching records, newest first.
    ///
    /// Paging counts resolved records, so a record deleted between evaluation
    /// and resolution is skipped rather than leaving a hole in the page.
    pub fn search_cancellable(
        &self,
        query: &Query,
        options: &QueryOptions,
        cancel: &CancelFlag,
    ) -> Result<Vec<Hit>> {
        let ids = self.evaluate(query, cancel)?;
        let limit = options
            .limit
            .or(self.config.query.default_limit)
            .unwrap_or(usize::MAX);

        let mut hits = Vec::new();
        let mut skipped = 0;
        for id in ids {
            if hits.len() >= limit {
                break;
            }
            cancel.check()?;
            let record = match self.store.get(id) {
                Ok(record) => record,
                Err(MarginaliaError::NotFound { .. }) => {
                    tracing::debug!(id = id.get(), "Record vanished before resolution");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if skipped < options.offset {
                skipped += 1;
                continue;
            }
            hits.push(Hit::from(record));
        }
        Ok(hits)
    }

    fn evaluate(&self, query: &Query, cancel: &CancelFlag) -> Result<Vec<RecordId>> {
        evaluate(&self.snapshot(), query, cancel, &self.stats)
    }

    /// Check the index against the record store.
    ///
    /// Returns `IndexCorruption` listing posting ids whose records are gone;
    /// [`Notebook::repair_index`] or [`Notebook::compact`] heals it.
    pub fn verify_index(&self) -> Result<()> {
        let scan = self.store.scan_live()?;
        let live: HashSet<RecordId> = scan.records.iter().map(|r| r.id).collect();
        let candidates = self.snapshot().dangling_ids(&live, scan.high_water);
        let dangling = self.settle_dangling(candidates);
        if dangling.is_empty() {
            Ok(())
        } else {
            tracing::warn!(count = dangling.len(), "Index references missing records");
            Err(MarginaliaError::IndexCorruption { dangling })
        }
    }

    /// Drop candidates whose deletes were still being published when they
    /// were computed
    pub(crate) fn settle_dangling(&self, candidates: Vec<RecordId>) -> Vec<RecordId> {
        if candidates.is_empty() {
            return candidates;
        }
        let _gate = self.write_gate.lock();
        self.snapshot().still_dangling(candidates)
    }

    /// Tag keys with live record counts, most used first
    pub fn tags(&self) -> Vec<(String, usize)> {
        self.snapshot().tag_counts()
    }

    pub fn stats(&self) -> Result<NotebookStats> {
        let store = self.store.stats()?;
        let index = self.snapshot().stats();
        Ok(NotebookStats::new(store, index))
    }
}

impl Drop for Notebook {
    fn drop(&mut self) {
        crate::log_query_stats!(self.stats, "notebook");
    }
}

#[cfg(test)]
mod tests;
