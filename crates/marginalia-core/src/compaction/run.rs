use super::{rebuild_from_store, should_compact, CompactionReport};
use crate::error::{MarginaliaError, Result};
use crate::index::IndexSnapshot;
use crate::notebook::Notebook;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

impl Notebook {
    /// Purge tombstoned records and swap in an index rebuilt without them.
    ///
    /// Readers keep querying the previous index until the swap. Writers wait
    /// only for the short replay-and-swap step; the purge and the space
    /// reclamation after it release the store's writer between batches.
    #[tracing::instrument(skip(self), fields(root = %self.root().display()))]
    pub fn compact(&self) -> Result<CompactionReport> {
        self.rebuild_index(true)
    }

    /// Rebuild the index from the record store without purging anything.
    ///
    /// Heals dangling posting entries left by a corrupted index.
    #[tracing::instrument(skip(self), fields(root = %self.root().display()))]
    pub fn repair_index(&self) -> Result<CompactionReport> {
        self.rebuild_index(false)
    }

    /// Whether the configured compaction policy is currently met
    pub fn should_compact(&self) -> Result<bool> {
        Ok(should_compact(
            &self.store.stats()?,
            &self.config().compaction,
        ))
    }

    /// Compact when the policy says so; `None` when nothing was done
    pub fn compact_if_needed(&self) -> Result<Option<CompactionReport>> {
        if self.should_compact()? {
            self.compact().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Run [`Notebook::compact`] on a dedicated worker thread
    pub fn compact_in_background(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<CompactionReport>>> {
        let notebook = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("marginalia-compaction".to_string())
            .spawn(move || {
                let result = notebook.compact();
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Background compaction failed");
                }
                result
            })?;
        Ok(handle)
    }

    fn rebuild_index(&self, purge: bool) -> Result<CompactionReport> {
        let start = Instant::now();
        // One rebuild at a time; a second caller waits and then rebuilds again
        let _running = self.compaction_lock.lock();

        let stemming = self.config().index.stemming;
        let rebuild = rebuild_from_store(&self.store, stemming)?;
        let mut index = rebuild.index;
        let candidates = self
            .snapshot()
            .dangling_ids(&rebuild.live, rebuild.high_water);

        // Tombstoned rows are hidden from readers already; removing them
        // needs no index change until the swap
        let purged = if purge {
            self.store.purge_tombstones()?.purged
        } else {
            Vec::new()
        };

        let (dangling, stats) = {
            let _gate = self.write_gate.lock();

            for record in self.store.scan_live_after(rebuild.high_water)? {
                index.index(&record);
            }
            for id in purged.iter().chain(&self.store.tombstoned_ids()?) {
                index.unindex(*id);
            }
            let dangling = self.snapshot().still_dangling(candidates);

            let stats = index.stats();
            *self.current.write() = IndexSnapshot::from(index);
            tracing::info!(
                terms = stats.terms,
                tags = stats.tags,
                live = stats.live_docs,
                "Swapped in rebuilt index"
            );
            (dangling, stats)
        };
        if !dangling.is_empty() {
            let err = MarginaliaError::IndexCorruption {
                dangling: dangling.clone(),
            };
            tracing::warn!(error = %err, ids = ?dangling, "Replaced corrupted index");
        }

        let mut vacuumed = false;
        let mut reclaimed_pages = 0;
        if !purged.is_empty() && self.config().compaction.vacuum {
            match self
                .store
                .reclaim_space(self.config().compaction.vacuum_step_pages)
            {
                Ok(Some(pages)) => {
                    vacuumed = true;
                    reclaimed_pages = pages;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Vacuum after compaction failed"),
            }
        }

        let report = CompactionReport {
            purged_records: purged.len(),
            rebuilt_terms: stats.terms,
            rebuilt_tags: stats.tags,
            healed_dangling: dangling.len(),
            vacuumed,
            reclaimed_pages,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            purged = report.purged_records,
            healed = report.healed_dangling,
            vacuumed = report.vacuumed,
            reclaimed_pages = report.reclaimed_pages,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Compaction finished"
        );
        crate::log_query_stats!(self.query_stats(), "compaction");
        Ok(report)
    }
}
