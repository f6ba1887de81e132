//! Structured logging setup and lightweight query counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Counters for query evaluation.
///
/// All operations are atomic and lock-free so readers can update them
/// concurrently without coordination.
#[derive(Debug, Default)]
pub struct QueryStats {
    queries: AtomicU64,
    cancelled: AtomicU64,
    stale_filtered: AtomicU64,
    results: AtomicU64,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed query and the number of ids it returned
    pub fn record_query(&self, result_count: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.results.fetch_add(result_count as u64, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record posting entries dropped because their record is tombstoned
    pub fn record_stale_filtered(&self, count: usize) {
        if count > 0 {
            self.stale_filtered
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn stale_filtered(&self) -> u64 {
        self.stale_filtered.load(Ordering::Relaxed)
    }

    /// Average number of ids returned per completed query
    pub fn mean_results(&self) -> f64 {
        let queries = self.queries.load(Ordering::Relaxed);
        if queries == 0 {
            0.0
        } else {
            self.results.load(Ordering::Relaxed) as f64 / queries as f64
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
        self.stale_filtered.store(0, Ordering::Relaxed);
        self.results.store(0, Ordering::Relaxed);
    }
}

/// Log query counters at debug level.
#[macro_export]
macro_rules! log_query_stats {
    ($stats:expr, $name:expr) => {
        tracing::debug!(
            operation = $name,
            queries = $stats.queries(),
            cancelled = $stats.cancelled(),
            stale_filtered = $stats.stale_filtered(),
            mean_results = $stats.mean_results(),
            "query_stats"
        );
    };
}

/// Helper macro for logging elapsed time at trace level.
///
/// Usage:
/// ```rust,ignore
/// let start = Instant::now();
/// // ... some work ...
/// trace_time!(start, "operation_name");
/// // Or with additional fields:
/// trace_time!(start, "operation_name", record_id = id.get());
/// ```
#[macro_export]
macro_rules! trace_time {
    ($start:expr, $name:expr) => {
        tracing::trace!(elapsed = ?$start.elapsed(), $name);
    };
    ($start:expr, $name:expr $(, $field:ident = $value:expr)*) => {
        tracing::trace!(elapsed = ?$start.elapsed(), $($field = $value),*, $name);
    };
}

/// Initialize structured logging for an embedding application
pub fn init_tracing(
    verbose: bool,
    log_level: Option<&str>,
    log_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, log_level) {
        (true, None) => "marginalia_core=debug",
        (false, None) => "marginalia_core=warn",
        (_, Some(level)) => return init_with_level(level, log_json),
    };

    init_with_level(level, log_json)
}

/// Build the filter directive for a bare level or a full directive string
fn filter_directive(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("marginalia_core={}", level)
    }
}

fn init_with_level(level: &str, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG wins, then MARGINALIA_LOG
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("MARGINALIA_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_span_events(
                        tracing_subscriber::fmt::format::FmtSpan::NEW
                            | tracing_subscriber::fmt::format::FmtSpan::CLOSE,
                    ),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
