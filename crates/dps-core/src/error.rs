//! Error taxonomy shared by every engine component

use arrow::error::ArrowError;
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, DpsError>;

/// Errors that can occur in engine operations
#[derive(Error, Debug)]
pub enum DpsError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Type mismatch on column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Name '{0}' already exists")]
    NameConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Corrupted project: {0}")]
    CorruptedProject(String),

    #[error("Unsupported project schema version {found} (newest supported: {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("Cache write failed: {0}")]
    CacheWriteFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("SQLite error: {0}")]
    Sqlite(String),
}

/// Fieldless view of [`DpsError`] for callers that branch on the kind only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidOperation,
    UnknownColumn,
    TypeMismatch,
    NameConflict,
    NotFound,
    SourceUnavailable,
    NetworkTimeout,
    AuthFailed,
    QueryFailed,
    Cancelled,
    CorruptedProject,
    UnsupportedSchemaVersion,
    CacheWriteFailed,
    Io,
}

impl DpsError {
    /// Shorthand for a type mismatch error
    pub fn type_mismatch(column: impl Into<String>, expected: impl Into<String>, found: impl Into<String>) -> Self {
        DpsError::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// The taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DpsError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            DpsError::UnknownColumn(_) => ErrorKind::UnknownColumn,
            DpsError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            DpsError::NameConflict(_) => ErrorKind::NameConflict,
            DpsError::NotFound(_) => ErrorKind::NotFound,
            DpsError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            DpsError::NetworkTimeout(_) => ErrorKind::NetworkTimeout,
            DpsError::AuthFailed(_) => ErrorKind::AuthFailed,
            DpsError::QueryFailed(_) | DpsError::Sqlite(_) => ErrorKind::QueryFailed,
            DpsError::Cancelled => ErrorKind::Cancelled,
            DpsError::CorruptedProject(_) | DpsError::Json(_) => ErrorKind::CorruptedProject,
            DpsError::UnsupportedSchemaVersion { .. } => ErrorKind::UnsupportedSchemaVersion,
            DpsError::CacheWriteFailed(_) => ErrorKind::CacheWriteFailed,
            DpsError::Io(_) => ErrorKind::Io,
            DpsError::Arrow(_) => ErrorKind::InvalidOperation,
            DpsError::Csv(_) => ErrorKind::SourceUnavailable,
        }
    }

    /// Whether the error should stay out of the user-facing activity log
    pub fn is_silent(&self) -> bool {
        matches!(self, DpsError::Cancelled)
    }
}

impl From<csv::Error> for DpsError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DpsError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DpsError::Csv(error.to_string()),
        }
    }
}

impl From<rusqlite::Error> for DpsError {
    fn from(error: rusqlite::Error) -> Self {
        DpsError::Sqlite(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DpsError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            DpsError::type_mismatch("a", "numeric", "text").kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(DpsError::Sqlite("boom".into()).kind(), ErrorKind::QueryFailed);
        assert!(DpsError::Cancelled.is_silent());
        assert!(!DpsError::NotFound("x".into()).is_silent());
    }

    #[test]
    fn test_display_messages() {
        let err = DpsError::UnsupportedSchemaVersion { found: 9, supported: 2 };
        assert_eq!(
            err.to_string(),
            "Unsupported project schema version 9 (newest supported: 2)"
        );
        assert_eq!(DpsError::UnknownColumn("x".into()).to_string(), "Unknown column 'x'");
    }
}
