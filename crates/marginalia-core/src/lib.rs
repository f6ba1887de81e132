//! Marginalia Core Library
//!
//! Durable note store with full-text and tag search. Notes are appended to a
//! SQLite-backed log and indexed in memory; deletes are tombstones until
//! compaction reclaims them.
//!
//! ```no_run
//! use marginalia_core::{Notebook, Query, QueryOptions};
//!
//! # fn main() -> marginalia_core::error::Result<()> {
//! let notebook = Notebook::open(std::path::Path::new("notes"))?;
//! let id = notebook.append("The Go Programming Language, ch. 8", "channels are simple to learn", &["go"])?;
//! let ids = notebook.query_ids(&Query::parse("channels tag:go")?, &QueryOptions::default())?;
//! assert_eq!(ids, vec![id]);
//! # Ok(())
//! # }
//! ```

pub mod compaction;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod logging;
pub mod notebook;
pub mod query;
pub mod record;
pub mod text;

#[cfg(test)]
pub(crate) mod test_support;

pub use compaction::CompactionReport;
pub use error::{MarginaliaError, Result};
pub use notebook::{Notebook, NotebookStats};
pub use query::{CancelFlag, Hit, Query, QueryOptions};
pub use record::{Record, RecordId};
