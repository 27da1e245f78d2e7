//! costscope core error type.
//!
//! Adapter crates return `Result<_, CoreError>`; the web crate maps it into
//! its own `ApiError` at the HTTP boundary.

use thiserror::Error;

/// Errors shared by every layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or unparseable configuration
    #[error("config error: {0}")]
    Config(String),

    /// Field validation failure
    #[error("validation failed for {field}: {message}")]
    Validation {
        /// Name of the offending field
        field: String,
        /// Reason
        message: String,
    },

    /// SQLite failure (prompt store, history copies, usage logs)
    #[error("sqlite error: {0}")]
    Sqlite(String),

    /// Subprocess could not be started or exited abnormally
    #[error("subprocess error: {0}")]
    Subprocess(String),

    /// Operation exceeded its deadline
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Unexpected internal state (poisoned lock, join failure)
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_mentions_deadline() {
        let err = CoreError::Timeout { timeout_ms: 10_000 };
        assert_eq!(err.to_string(), "timed out after 10000ms");
    }

    #[test]
    fn io_error_converts() {
        fn open() -> Result<(), CoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(CoreError::Io(_))));
    }
}
