use chrono::{DateTime, Duration, Utc};
use costscope_core::error::CoreError;
use costscope_core::models::usage::UsageEvent;
use costscope_core::ports::storage::PromptStore;
use tracing::{debug, info};

use super::SqlitePromptStore;

/// One stored row (query result)
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRecord {
    pub id: i64,
    /// Insert time (RFC3339)
    pub timestamp: String,
    pub tool_name: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub prompt_text: Option<String>,
    pub response_text: Option<String>,
    pub source: String,
}

impl SqlitePromptStore {
    /// Insert with an explicit timestamp.
    pub fn insert_at(&self, event: &UsageEvent, at: DateTime<Utc>) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO prompts (
                timestamp, tool_name, model, input_tokens, output_tokens,
                cache_creation_tokens, cache_read_tokens, cost_usd,
                prompt_text, response_text, source, project
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                at.to_rfc3339(),
                event.tool,
                event.model,
                event.input_tokens as i64,
                event.output_tokens as i64,
                event.cache_creation_tokens as i64,
                event.cache_read_tokens as i64,
                event.cost_usd,
                event.prompt_text,
                event.response_text,
                event.source.as_str(),
                event.project,
            ],
        )
        .map_err(|e| CoreError::Sqlite(format!("failed to store prompt: {e}")))?;

        debug!("prompt stored: {} / {}", event.tool, event.model);
        Ok(())
    }

    pub fn count(&self) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM prompts", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| CoreError::Sqlite(format!("failed to count prompts: {e}")))
    }

    /// Newest rows first.
    pub fn recent(&self, limit: usize) -> Result<Vec<PromptRecord>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, tool_name, model, input_tokens, output_tokens,
                        cost_usd, prompt_text, response_text, source
                 FROM prompts ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| CoreError::Sqlite(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(PromptRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    tool_name: row.get(2)?,
                    model: row.get(3)?,
                    input_tokens: row.get::<_, i64>(4)? as u64,
                    output_tokens: row.get::<_, i64>(5)? as u64,
                    cost_usd: row.get(6)?,
                    prompt_text: row.get(7)?,
                    response_text: row.get(8)?,
                    source: row.get(9)?,
                })
            })
            .map_err(|e| CoreError::Sqlite(format!("failed to query prompts: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::Sqlite(format!("failed to read prompt row: {e}")))
    }
}

impl PromptStore for SqlitePromptStore {
    fn insert(&self, event: &UsageEvent) -> Result<(), CoreError> {
        self.insert_at(event, Utc::now())
    }

    fn cleanup_expired(&self) -> Result<usize, CoreError> {
        let cutoff = (Utc::now() - Duration::days(self.retention_days as i64)).to_rfc3339();

        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM prompts WHERE timestamp < ?1",
                rusqlite::params![cutoff],
            )
            .map_err(|e| CoreError::Sqlite(format!("retention cleanup failed: {e}")))?;

        if deleted > 0 {
            info!(
                "retention: deleted {deleted} prompts older than {} days",
                self.retention_days
            );
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costscope_core::models::usage::UsageSource;

    fn event(tool: &str, prompt: Option<&str>) -> UsageEvent {
        UsageEvent {
            tool: tool.to_string(),
            model: "gpt-4o".to_string(),
            input_tokens: 1_000,
            output_tokens: 500,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost_usd: 0.0075,
            prompt_text: prompt.map(str::to_string),
            response_text: None,
            source: UsageSource::Browser,
            project: None,
        }
    }

    #[test]
    fn insert_and_read_back() {
        let store = SqlitePromptStore::open_in_memory(90).unwrap();
        store.insert(&event("chatgpt", Some("explain lifetimes"))).unwrap();

        let rows = store.recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tool_name, "chatgpt");
        assert_eq!(rows[0].input_tokens, 1_000);
        assert_eq!(rows[0].prompt_text.as_deref(), Some("explain lifetimes"));
        assert_eq!(rows[0].response_text, None);
        assert_eq!(rows[0].source, "browser");
    }

    #[test]
    fn recent_is_newest_first() {
        let store = SqlitePromptStore::open_in_memory(90).unwrap();
        store.insert(&event("first", None)).unwrap();
        store.insert(&event("second", None)).unwrap();

        let rows = store.recent(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tool_name, "second");
    }

    #[test]
    fn cleanup_deletes_only_expired_rows() {
        let store = SqlitePromptStore::open_in_memory(30).unwrap();
        store
            .insert_at(&event("old", None), Utc::now() - Duration::days(31))
            .unwrap();
        store
            .insert_at(&event("recent", None), Utc::now() - Duration::days(29))
            .unwrap();
        store.insert(&event("now", None)).unwrap();

        assert_eq!(store.cleanup_expired().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.recent(10).unwrap().iter().all(|r| r.tool_name != "old"));

        assert_eq!(store.cleanup_expired().unwrap(), 0);
    }
}
