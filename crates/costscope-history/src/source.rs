//! Outcome of reading one external data source.

use std::fmt;

/// Rows read from a source, or the reason it produced nothing this cycle.
/// A skipped source never advances its checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRead<T> {
    Rows(T),
    Skipped(SkipReason),
}

/// Why a source yielded no data this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    /// The owning application holds a lock on the database
    Locked,
    PermissionDenied,
    /// Expected tables or columns are absent
    SchemaDrift(String),
    Unreadable(String),
}

impl SkipReason {
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SkipReason::NotFound,
            std::io::ErrorKind::PermissionDenied => SkipReason::PermissionDenied,
            _ => SkipReason::Unreadable(err.to_string()),
        }
    }

    pub fn from_sqlite(err: &rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => SkipReason::Locked,
            Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly) => SkipReason::PermissionDenied,
            _ => SkipReason::Unreadable(err.to_string()),
        }
    }

    /// Worth a warning rather than a debug line
    pub fn is_transient(&self) -> bool {
        matches!(self, SkipReason::Locked | SkipReason::PermissionDenied)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found"),
            SkipReason::Locked => write!(f, "database locked"),
            SkipReason::PermissionDenied => write!(f, "permission denied"),
            SkipReason::SchemaDrift(detail) => write!(f, "unexpected schema: {detail}"),
            SkipReason::Unreadable(detail) => write!(f, "unreadable: {detail}"),
        }
    }
}
