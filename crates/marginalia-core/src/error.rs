//! Error types for marginalia
//!
//! Error classes:
//! - Recoverable, surfaced to the caller: `NotFound`, `InvalidValue`, `InvalidQuery`, `Cancelled`
//! - Storage: `StorageFull` (retry after freeing space), `InvalidStore`
//! - Index: `IndexCorruption` (healed by rebuilding from the record store)

mod macros;

use crate::record::RecordId;
use thiserror::Error;

/// Errors that can occur during marginalia operations
#[derive(Error, Debug)]
pub enum MarginaliaError {
    #[error("record not found: {id}")]
    NotFound { id: RecordId },

    #[error("storage full: {reason}")]
    StorageFull { reason: String },

    #[error("index corruption: {} posting id(s) reference missing records", dangling.len())]
    IndexCorruption { dangling: Vec<RecordId> },

    #[error("invalid query at position {position}: {reason}")]
    InvalidQuery { position: usize, reason: String },

    #[error("invalid {context}: {value}")]
    InvalidValue { context: String, value: String },

    #[error("invalid store: {reason}")]
    InvalidStore { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to {operation}: {reason}")]
    FailedOperation { operation: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for MarginaliaError {
    fn from(err: rusqlite::Error) -> Self {
        MarginaliaError::db_operation("access database", err)
    }
}

impl MarginaliaError {
    /// Create an error for a failed database operation.
    ///
    /// SQLite reports both a full disk and an exhausted `max_page_count` quota
    /// as `SQLITE_FULL`; both surface as [`MarginaliaError::StorageFull`].
    pub fn db_operation(operation: &str, error: rusqlite::Error) -> Self {
        if is_disk_full(&error) {
            return MarginaliaError::StorageFull {
                reason: format!("{}: {}", operation, error),
            };
        }
        MarginaliaError::FailedOperation {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }

    /// Create an error for a failed transaction operation
    pub fn transaction(operation: &str, error: rusqlite::Error) -> Self {
        Self::db_operation(&format!("{} transaction", operation), error)
    }

    /// Create an error for an invalid value or configuration
    pub fn invalid_value(context: &str, value: impl std::fmt::Display) -> Self {
        MarginaliaError::InvalidValue {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    /// Create an error for a malformed query
    pub fn invalid_query(position: usize, reason: impl Into<String>) -> Self {
        MarginaliaError::InvalidQuery {
            position,
            reason: reason.into(),
        }
    }

    /// Whether the caller can reasonably retry or correct the request.
    ///
    /// Only `InvalidStore` and generic failures are treated as fatal; index
    /// corruption is healed by a rebuild.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MarginaliaError::NotFound { .. }
            | MarginaliaError::StorageFull { .. }
            | MarginaliaError::IndexCorruption { .. }
            | MarginaliaError::InvalidQuery { .. }
            | MarginaliaError::InvalidValue { .. }
            | MarginaliaError::Cancelled => true,

            MarginaliaError::InvalidStore { .. }
            | MarginaliaError::Io(_)
            | MarginaliaError::Json(_)
            | MarginaliaError::Toml(_)
            | MarginaliaError::FailedOperation { .. }
            | MarginaliaError::Other(_) => false,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            MarginaliaError::NotFound { .. } => "not_found",
            MarginaliaError::StorageFull { .. } => "storage_full",
            MarginaliaError::IndexCorruption { .. } => "index_corruption",
            MarginaliaError::InvalidQuery { .. } => "invalid_query",
            MarginaliaError::InvalidValue { .. } => "invalid_value",
            MarginaliaError::InvalidStore { .. } => "invalid_store",
            MarginaliaError::Cancelled => "cancelled",
            MarginaliaError::Io(_) => "io_error",
            MarginaliaError::Json(_) => "json_error",
            MarginaliaError::Toml(_) => "toml_error",
            MarginaliaError::FailedOperation { .. } => "failed_operation",
            MarginaliaError::Other(_) => "other",
        }
    }

    /// Convert error to JSON representation for structured error output
    pub fn to_json(&self) -> serde_json::Value {
        let mut error_obj = serde_json::json!({
            "type": self.error_type(),
            "message": self.to_string(),
            "recoverable": self.is_recoverable(),
        });

        match self {
            MarginaliaError::NotFound { id } => {
                error_obj["id"] = serde_json::json!(id.get());
            }
            MarginaliaError::IndexCorruption { dangling } => {
                error_obj["dangling"] =
                    serde_json::json!(dangling.iter().map(|id| id.get()).collect::<Vec<_>>());
            }
            MarginaliaError::InvalidQuery { position, .. } => {
                error_obj["position"] = serde_json::json!(position);
            }
            _ => {}
        }

        serde_json::json!({ "error": error_obj })
    }
}

fn is_disk_full(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::DiskFull
    )
}

/// Result type alias for marginalia operations
pub type Result<T> = std::result::Result<T, MarginaliaError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn full_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            Some("database or disk is full".to_string()),
        )
    }

    #[test]
    fn test_sqlite_full_maps_to_storage_full() {
        let err = MarginaliaError::db_operation("append record", full_error());
        assert!(matches!(err, MarginaliaError::StorageFull { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_sqlite_errors_are_failed_operations() {
        let err = MarginaliaError::db_operation("read record", rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, MarginaliaError::FailedOperation { .. }));
        assert!(!err.is_recoverable());
        assert!(err.to_string().starts_with("failed to read record"));
    }

    #[test]
    fn test_to_json_includes_type_and_id() {
        let err = MarginaliaError::NotFound {
            id: RecordId::new(42),
        };
        let json = err.to_json();
        assert_eq!(json["error"]["type"], "not_found");
        assert_eq!(json["error"]["id"], 42);
        assert_eq!(json["error"]["message"], "record not found: 42");
    }

    #[test]
    fn test_index_corruption_message_counts_ids() {
        let err = MarginaliaError::IndexCorruption {
            dangling: vec![RecordId::new(1), RecordId::new(9)],
        };
        assert_eq!(
            err.to_string(),
            "index corruption: 2 posting id(s) reference missing records"
        );
        assert_eq!(err.to_json()["error"]["dangling"][1], 9);
    }
}
