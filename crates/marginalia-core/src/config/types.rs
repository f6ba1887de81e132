//! Configuration type definitions

use serde::{Deserialize, Serialize};

/// Current notebook format version
pub const NOTEBOOK_FORMAT_VERSION: u32 = 1;

/// Notebook configuration (`config.toml` in the notebook root)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookConfig {
    /// Notebook format version for compatibility checking
    #[serde(default = "default_version")]
    pub version: u32,

    /// Record store durability and size settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Index tokenization settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Compaction policy
    #[serde(default)]
    pub compaction: CompactionConfig,
}

/// SQLite `synchronous` level for the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// fsync on every commit
    #[default]
    Full,
    /// fsync at WAL checkpoints only; commits may roll back on power loss
    Normal,
}

impl SyncMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SyncMode::Full => "FULL",
            SyncMode::Normal => "NORMAL",
        }
    }
}

/// Configuration for the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Durability of each append (default: full)
    #[serde(default)]
    pub synchronous: SyncMode,

    /// Upper bound on the database file size; appends past it fail with `StorageFull`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,

    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Configuration for index construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Apply English stemming to body terms and query terms
    #[serde(default)]
    pub stemming: bool,
}

/// Configuration for query evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Limit applied when a query does not set one (unlimited when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<usize>,
}

/// Configuration for the compaction trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Stale fraction of indexed records at which compaction is due
    #[serde(default = "default_tombstone_ratio")]
    pub tombstone_ratio: f64,

    /// Minimum number of tombstones before the ratio is considered
    #[serde(default = "default_min_tombstones")]
    pub min_tombstones: usize,

    /// Return pages freed by a purge to the filesystem
    #[serde(default = "default_vacuum")]
    pub vacuum: bool,

    /// Pages released per incremental vacuum step; the writer is free
    /// between steps
    #[serde(default = "default_vacuum_step_pages")]
    pub vacuum_step_pages: u32,
}

fn default_version() -> u32 {
    NOTEBOOK_FORMAT_VERSION
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_tombstone_ratio() -> f64 {
    0.25
}

fn default_min_tombstones() -> usize {
    16
}

fn default_vacuum() -> bool {
    true
}

fn default_vacuum_step_pages() -> u32 {
    128
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            version: NOTEBOOK_FORMAT_VERSION,
            storage: StorageConfig::default(),
            index: IndexConfig::default(),
            query: QueryConfig::default(),
            compaction: CompactionConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            synchronous: SyncMode::default(),
            max_size_bytes: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            tombstone_ratio: default_tombstone_ratio(),
            min_tombstones: default_min_tombstones(),
            vacuum: default_vacuum(),
            vacuum_step_pages: default_vacuum_step_pages(),
        }
    }
}
