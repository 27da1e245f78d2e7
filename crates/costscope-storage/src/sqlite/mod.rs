//! SQLite prompt store adapter.
//!
//! `PromptStore` port implementation.
//!
//! # Modules
//! - `prompts`: inserts, queries and retention for the `prompts` table

mod prompts;

pub use prompts::PromptRecord;

use costscope_core::error::CoreError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::migration;

/// SQLite prompt store.
pub struct SqlitePromptStore {
    pub(super) conn: Mutex<Connection>,
    pub(super) retention_days: u32,
}

impl SqlitePromptStore {
    /// File-backed store. Creates the parent directory when missing.
    pub fn open(path: &Path, retention_days: u32) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CoreError::Sqlite(format!("failed to open {}: {e}", path.display())))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )
        .map_err(|e| CoreError::Sqlite(format!("PRAGMA setup failed: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Sqlite(format!("migration failed: {e}")))?;

        info!("prompt store ready: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            retention_days,
        })
    }

    /// In-memory store (tests)
    pub fn open_in_memory(retention_days: u32) -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Sqlite(format!("failed to open in-memory database: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Sqlite(format!("migration failed: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            retention_days,
        })
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("failed to acquire lock: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("prompts.db");
        let store = SqlitePromptStore::open(&path, 90).unwrap();
        assert!(path.exists());
        assert_eq!(store.retention_days(), 90);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn reopen_keeps_rows() {
        use costscope_core::models::usage::{UsageEvent, UsageSource};
        use costscope_core::ports::storage::PromptStore;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompts.db");
        {
            let store = SqlitePromptStore::open(&path, 90).unwrap();
            store
                .insert(&UsageEvent {
                    tool: "claude-code".to_string(),
                    model: "claude-sonnet-4".to_string(),
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_creation_tokens: 0,
                    cache_read_tokens: 0,
                    cost_usd: 0.001,
                    prompt_text: None,
                    response_text: None,
                    source: UsageSource::Cli,
                    project: None,
                })
                .unwrap();
        }
        let store = SqlitePromptStore::open(&path, 90).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
