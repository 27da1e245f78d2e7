//! Schema migration.
//!
//! Versioned SQLite schema management.

use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
const CURRENT_VERSION: u32 = 2;

/// Bring the schema up to [`CURRENT_VERSION`].
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = get_version(conn)?;
    info!("schema version: {current}, target: {CURRENT_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn get_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    let result: Result<u32, _> = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    );
    result.or(Ok(0))
}

/// V1: prompts table
fn migrate_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("running migration V1: prompts table");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS prompts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            model TEXT NOT NULL,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cost_usd REAL NOT NULL DEFAULT 0,
            prompt_text TEXT,
            response_text TEXT,
            source TEXT NOT NULL,
            project TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_prompts_timestamp ON prompts(timestamp);
        CREATE INDEX IF NOT EXISTS idx_prompts_tool ON prompts(tool_name);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;

    info!("migration V1 complete");
    Ok(())
}

/// V2: cache token columns
fn migrate_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("running migration V2: cache token columns");

    conn.execute_batch(
        "
        ALTER TABLE prompts ADD COLUMN cache_creation_tokens INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE prompts ADD COLUMN cache_read_tokens INTEGER NOT NULL DEFAULT 0;

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;

    info!("migration V2 complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        let columns: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('prompts')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(columns, 13);
    }
}
