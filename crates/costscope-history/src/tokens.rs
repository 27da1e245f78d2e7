//! Token usage scanner.
//!
//! Two local sources:
//! - JSONL transcripts (`~/.claude/projects/**/*.jsonl`), read line by line
//!   from a per-file byte offset
//! - a SQLite session log (`~/.codex/sqlite/codex-dev.db`), read by
//!   `rowid` cursor
//!
//! A source's cursor advances only past events the prompt store accepted.
//! On the first failed insert the source stops for the cycle, so the next
//! cycle (or a restart from `<state_dir>/token_usage/state.json`) resumes
//! at the failed event. Metrics are emitted after the insert, so a retried
//! event is counted once.

use costscope_core::config::TokenSources;
use costscope_core::models::usage::{UsageEvent, UsageSource};
use costscope_core::pricing::estimate_cost;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::checkpoint::CheckpointStore;
use crate::incremental::read_delta;
use crate::source::{SkipReason, SourceRead};
use crate::usage::UsageRecorder;

/// Tool label for JSONL transcript usage
pub const JSONL_TOOL: &str = "claude-code";

/// Tool label for SQL session log usage
pub const SQL_TOOL: &str = "codex-cli";

const UNKNOWN_MODEL: &str = "unknown";

/// Durable scanner position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    #[serde(default)]
    pub file_offsets: BTreeMap<String, u64>,
    #[serde(default)]
    pub sql_last_rowid: i64,
}

/// Where the scanner looks. `None` disables a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLogPaths {
    pub jsonl_root: Option<PathBuf>,
    pub sql_log: Option<PathBuf>,
}

impl TokenLogPaths {
    /// Default locations under the home directory, filtered by the
    /// per-source toggles.
    pub fn from_home(sources: &TokenSources) -> Self {
        let Some(dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };
        let home = dirs.home_dir();
        Self {
            jsonl_root: sources
                .claude_code
                .then(|| home.join(".claude").join("projects")),
            sql_log: sources
                .codex
                .then(|| home.join(".codex").join("sqlite").join("codex-dev.db")),
        }
    }
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenScanReport {
    /// Events stored and counted
    pub events: usize,
    /// Sources stopped at an event the store rejected
    pub store_failures: usize,
    /// Checkpoint written
    pub committed: bool,
}

/// Incremental token usage scanner.
pub struct TokenUsageScanner {
    paths: TokenLogPaths,
    recorder: UsageRecorder,
    state: TokenState,
    checkpoint: CheckpointStore<TokenState>,
}

impl TokenUsageScanner {
    pub fn new(paths: TokenLogPaths, state_dir: &Path, recorder: UsageRecorder) -> Self {
        let checkpoint = CheckpointStore::new(state_dir.join("token_usage").join("state.json"));
        let state = checkpoint.load();
        Self {
            paths,
            recorder,
            state,
            checkpoint,
        }
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    /// Run one cycle: both sources, then retention cleanup, then the
    /// checkpoint.
    pub fn scan(&mut self) -> TokenScanReport {
        let mut report = TokenScanReport::default();

        if let Some(root) = self.paths.jsonl_root.clone() {
            self.scan_jsonl(&root, &mut report);
        }
        if let Some(db) = self.paths.sql_log.clone() {
            self.scan_sql(&db, &mut report);
        }

        if let Err(e) = self.recorder.cleanup_expired() {
            warn!("prompt retention cleanup failed: {e}");
        }

        if report.store_failures > 0 {
            warn!(
                "{} usage sources stopped at an unstored event, retrying next cycle",
                report.store_failures
            );
        }
        match self.checkpoint.save(&self.state) {
            Ok(()) => report.committed = true,
            Err(e) => warn!("failed to save token usage state: {e}"),
        }
        report
    }

    fn scan_jsonl(&mut self, root: &Path, report: &mut TokenScanReport) {
        if !root.is_dir() {
            return;
        }
        let files = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "jsonl"))
            .map(|entry| entry.into_path());

        for path in files {
            let key = path.to_string_lossy().to_string();
            let offset = self.state.file_offsets.get(&key).copied().unwrap_or(0);
            let delta = match read_delta(&path, offset) {
                Ok(Some(delta)) => delta,
                Ok(None) => continue,
                Err(e) => {
                    debug!("cannot read {}: {e}", path.display());
                    continue;
                }
            };
            let project = path
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().to_string());

            let mut committed = if delta.truncated { 0 } else { offset };
            let mut failed = false;
            for (line, end) in delta.lines() {
                if let Some(event) = parse_jsonl_entry(&line, project.as_deref()) {
                    if !self.forward(&event, report) {
                        failed = true;
                        break;
                    }
                }
                committed = end;
            }
            self.state.file_offsets.insert(key, committed);
            if failed {
                report.store_failures += 1;
            }
        }
    }

    fn scan_sql(&mut self, db: &Path, report: &mut TokenScanReport) {
        if !db.exists() {
            return;
        }
        let rows = match read_sql_usage(db, self.state.sql_last_rowid) {
            SourceRead::Rows(rows) => rows,
            SourceRead::Skipped(reason) if reason.is_transient() => {
                warn!("usage log {} skipped: {reason}", db.display());
                return;
            }
            SourceRead::Skipped(reason) => {
                debug!("usage log {} skipped: {reason}", db.display());
                return;
            }
        };
        for row in rows {
            let rowid = row.rowid;
            if !self.forward(&row.into_event(), report) {
                report.store_failures += 1;
                return;
            }
            self.state.sql_last_rowid = rowid;
        }
    }

    /// `false` when the store rejected the event; it is then left for the
    /// next cycle.
    fn forward(&self, event: &UsageEvent, report: &mut TokenScanReport) -> bool {
        match self.recorder.record_durable(event) {
            Ok(()) => {
                report.events += 1;
                true
            }
            Err(e) => {
                debug!("failed to store usage event: {e}");
                false
            }
        }
    }
}

fn nested<'a>(entry: &'a Value, key: &str) -> Option<&'a Value> {
    entry
        .get(key)
        .filter(|v| !v.is_null())
        .or_else(|| entry.get("message").and_then(|m| m.get(key)))
        .filter(|v| !v.is_null())
}

fn token_count(usage: &Value, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        _ => None,
    }
}

/// One transcript line to a usage event. `None` for malformed JSON,
/// entries without usage, and entries with zero input and output tokens.
pub fn parse_jsonl_entry(line: &str, project: Option<&str>) -> Option<UsageEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let entry: Value = serde_json::from_str(line).ok()?;
    let usage = nested(&entry, "usage").filter(|u| u.is_object())?;

    let input_tokens = token_count(usage, "input_tokens");
    let output_tokens = token_count(usage, "output_tokens");
    if input_tokens == 0 && output_tokens == 0 {
        return None;
    }
    let cache_creation_tokens = token_count(usage, "cache_creation_input_tokens");
    let cache_read_tokens = token_count(usage, "cache_read_input_tokens");

    let model = nested(&entry, "model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string();

    let text = nested(&entry, "content").and_then(content_text);
    let role = nested(&entry, "role").and_then(Value::as_str).unwrap_or("");
    let (prompt_text, response_text) = match role {
        "user" => (text, None),
        "assistant" => (None, text),
        _ => (None, None),
    };

    let cost_usd = estimate_cost(
        &model,
        input_tokens,
        output_tokens,
        cache_creation_tokens,
        cache_read_tokens,
    );
    Some(UsageEvent {
        tool: JSONL_TOOL.to_string(),
        model,
        input_tokens,
        output_tokens,
        cache_creation_tokens,
        cache_read_tokens,
        cost_usd,
        prompt_text,
        response_text,
        source: UsageSource::Cli,
        project: project.map(str::to_string),
    })
}

/// One row of the SQL session log
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUsageRow {
    pub rowid: i64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
}

impl SqlUsageRow {
    fn into_event(self) -> UsageEvent {
        let cost_usd = estimate_cost(&self.model, self.input_tokens, self.output_tokens, 0, 0);
        UsageEvent {
            tool: SQL_TOOL.to_string(),
            model: self.model,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost_usd,
            prompt_text: None,
            response_text: None,
            source: UsageSource::Cli,
            project: None,
        }
    }
}

/// Rows of `sessions` after `last_rowid` with input tokens. The log is
/// skipped when the table or its `input_tokens` column is missing;
/// `output_tokens` and `model` are optional.
pub fn read_sql_usage(db: &Path, last_rowid: i64) -> SourceRead<Vec<SqlUsageRow>> {
    let conn = match Connection::open_with_flags(
        db,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) {
        Ok(conn) => conn,
        Err(e) => return SourceRead::Skipped(SkipReason::from_sqlite(&e)),
    };
    match query_sessions(&conn, last_rowid) {
        Ok(read) => read,
        Err(e) => SourceRead::Skipped(SkipReason::from_sqlite(&e)),
    }
}

fn query_sessions(
    conn: &Connection,
    last_rowid: i64,
) -> Result<SourceRead<Vec<SqlUsageRow>>, rusqlite::Error> {
    let has_table: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sessions'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if has_table.is_none() {
        return Ok(SourceRead::Skipped(SkipReason::SchemaDrift(
            "no sessions table".to_string(),
        )));
    }

    let mut stmt = conn.prepare("PRAGMA table_info(sessions)")?;
    let columns: HashSet<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    if !columns.contains("input_tokens") {
        return Ok(SourceRead::Skipped(SkipReason::SchemaDrift(
            "sessions.input_tokens missing".to_string(),
        )));
    }

    let output_col = if columns.contains("output_tokens") {
        "output_tokens"
    } else {
        "0"
    };
    let model_col = if columns.contains("model") {
        "model"
    } else {
        "NULL"
    };
    let sql = format!(
        "SELECT rowid, input_tokens, {output_col}, {model_col} FROM sessions \
         WHERE rowid > ?1 AND input_tokens > 0 ORDER BY rowid"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([last_rowid], |row| {
            let input: Option<i64> = row.get(1)?;
            let output: Option<i64> = row.get(2)?;
            let model: Option<String> = row.get(3)?;
            Ok(SqlUsageRow {
                rowid: row.get(0)?,
                input_tokens: input.unwrap_or(0).max(0) as u64,
                output_tokens: output.unwrap_or(0).max(0) as u64,
                model: model
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SourceRead::Rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::tests::doubles::RecordingStore;
    use costscope_core::metrics::{token_labels, Counter, InMemorySink};
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    const ASSISTANT: &str = r#"{"type":"assistant","message":{"role":"assistant","model":"claude-sonnet-4-5-20250929","content":[{"type":"text","text":"Done."}],"usage":{"input_tokens":1000,"output_tokens":200,"cache_read_input_tokens":5000}}}"#;

    fn append(path: &Path, text: &str) {
        let mut f = OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    fn jsonl_setup(dir: &TempDir) -> PathBuf {
        let project = dir.path().join("projects").join("-home-dev-app");
        fs::create_dir_all(&project).unwrap();
        project.join("session.jsonl")
    }

    fn scanner(dir: &TempDir, recorder: UsageRecorder) -> TokenUsageScanner {
        let paths = TokenLogPaths {
            jsonl_root: Some(dir.path().join("projects")),
            sql_log: Some(dir.path().join("codex.db")),
        };
        TokenUsageScanner::new(paths, &dir.path().join("state"), recorder)
    }

    #[test]
    fn parses_nested_usage_and_model() {
        let event = parse_jsonl_entry(ASSISTANT, Some("app")).unwrap();
        assert_eq!(event.model, "claude-sonnet-4-5-20250929");
        assert_eq!(event.input_tokens, 1000);
        assert_eq!(event.output_tokens, 200);
        assert_eq!(event.cache_read_tokens, 5000);
        assert_eq!(event.response_text.as_deref(), Some("Done."));
        assert_eq!(event.prompt_text, None);
        assert_eq!(event.project.as_deref(), Some("app"));
        assert!(event.cost_usd > 0.0);
    }

    #[test]
    fn top_level_usage_and_unknown_model() {
        let line = r#"{"usage":{"input_tokens":5,"output_tokens":0}}"#;
        let event = parse_jsonl_entry(line, None).unwrap();
        assert_eq!(event.model, "unknown");
    }

    #[test]
    fn skips_zero_usage_and_malformed_lines() {
        let zero = r#"{"usage":{"input_tokens":0,"output_tokens":0}}"#;
        assert!(parse_jsonl_entry(zero, None).is_none());
        assert!(parse_jsonl_entry(r#"{"type":"summary"}"#, None).is_none());
        assert!(parse_jsonl_entry("{oops", None).is_none());
        assert!(parse_jsonl_entry("", None).is_none());
    }

    #[test]
    fn jsonl_scan_is_incremental_and_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let file = jsonl_setup(&dir);
        append(&file, &format!("{ASSISTANT}\nnot json\n{ASSISTANT}\n"));

        let sink = Arc::new(InMemorySink::new());
        let mut scanner = scanner(&dir, UsageRecorder::new(sink.clone()));

        let report = scanner.scan();
        assert_eq!(report.events, 2);
        assert!(report.committed);
        let labels = token_labels(JSONL_TOOL, "claude-sonnet-4-5-20250929");
        assert_eq!(sink.counter(Counter::TokensInput, &labels), 2000.0);

        assert_eq!(scanner.scan().events, 0);
    }

    #[test]
    fn failed_insert_is_retried_once_next_cycle() {
        let dir = TempDir::new().unwrap();
        let file = jsonl_setup(&dir);
        append(&file, &format!("{ASSISTANT}\n"));

        let sink = Arc::new(InMemorySink::new());
        let store = Arc::new(RecordingStore::failing());
        let recorder = UsageRecorder::new(sink.clone()).with_store(store.clone());
        let mut scanner = scanner(&dir, recorder);

        let report = scanner.scan();
        assert_eq!(report.events, 0);
        assert_eq!(report.store_failures, 1);
        assert_eq!(sink.counter_total(Counter::TokensInput), 0.0);
        let key = file.to_string_lossy().to_string();
        assert_eq!(scanner.state().file_offsets.get(&key), Some(&0));

        store.set_failing(false);
        let report = scanner.scan();
        assert_eq!(report.events, 1);
        assert!(report.committed);
        assert_eq!(store.len(), 1);
        assert_eq!(sink.counter_total(Counter::TokensInput), 1000.0);

        assert_eq!(scanner.scan().events, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failure_mid_file_keeps_stored_lines_committed() {
        let dir = TempDir::new().unwrap();
        let file = jsonl_setup(&dir);
        append(&file, &format!("{ASSISTANT}\n"));

        let store = Arc::new(RecordingStore::default());
        let recorder = UsageRecorder::new(Arc::new(InMemorySink::new())).with_store(store.clone());
        let mut first = scanner(&dir, recorder.clone());
        assert_eq!(first.scan().events, 1);

        append(&file, &format!("{ASSISTANT}\n{ASSISTANT}\n"));
        store.set_failing(true);
        assert_eq!(first.scan().store_failures, 1);

        // a restart resumes at the first unstored line
        store.set_failing(false);
        let mut restarted = scanner(&dir, recorder);
        assert_eq!(restarted.scan().events, 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn sql_failure_keeps_rowid_at_last_stored_row() {
        let dir = TempDir::new().unwrap();
        codex_db(
            &dir,
            "CREATE TABLE sessions (input_tokens INTEGER, output_tokens INTEGER, model TEXT);
             INSERT INTO sessions VALUES (100, 10, 'o3');",
        );
        let store = Arc::new(RecordingStore::failing());
        let recorder = UsageRecorder::new(Arc::new(InMemorySink::new())).with_store(store.clone());
        let mut scanner = scanner(&dir, recorder);

        assert_eq!(scanner.scan().store_failures, 1);
        assert_eq!(scanner.state().sql_last_rowid, 0);

        store.set_failing(false);
        assert_eq!(scanner.scan().events, 1);
        assert_eq!(scanner.state().sql_last_rowid, 1);
        assert_eq!(store.len(), 1);
    }

    fn codex_db(dir: &TempDir, schema: &str) -> Connection {
        let conn = Connection::open(dir.path().join("codex.db")).unwrap();
        conn.execute_batch(schema).unwrap();
        conn
    }

    #[test]
    fn sql_log_reads_new_rows_only() {
        let dir = TempDir::new().unwrap();
        let conn = codex_db(
            &dir,
            "CREATE TABLE sessions (id TEXT, input_tokens INTEGER, output_tokens INTEGER, model TEXT);
             INSERT INTO sessions VALUES ('a', 100, 10, 'o3');
             INSERT INTO sessions VALUES ('b', 0, 0, 'o3');
             INSERT INTO sessions VALUES ('c', 50, 5, NULL);",
        );
        let sink = Arc::new(InMemorySink::new());
        let mut scanner = scanner(&dir, UsageRecorder::new(sink.clone()));

        assert_eq!(scanner.scan().events, 2);
        assert_eq!(scanner.state().sql_last_rowid, 3);
        assert_eq!(sink.counter(Counter::TokensInput, &token_labels(SQL_TOOL, "o3")), 100.0);
        assert_eq!(sink.counter(Counter::TokensInput, &token_labels(SQL_TOOL, "unknown")), 50.0);

        conn.execute("INSERT INTO sessions VALUES ('d', 7, 1, 'o3')", []).unwrap();
        assert_eq!(scanner.scan().events, 1);
    }

    #[test]
    fn sql_log_tolerates_missing_optional_columns() {
        let dir = TempDir::new().unwrap();
        codex_db(
            &dir,
            "CREATE TABLE sessions (input_tokens INTEGER);
             INSERT INTO sessions VALUES (42);",
        );
        match read_sql_usage(&dir.path().join("codex.db"), 0) {
            SourceRead::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].output_tokens, 0);
                assert_eq!(rows[0].model, "unknown");
            }
            SourceRead::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn sql_log_schema_drift_is_skipped() {
        let dir = TempDir::new().unwrap();
        codex_db(&dir, "CREATE TABLE sessions (tokens INTEGER);");
        assert!(matches!(
            read_sql_usage(&dir.path().join("codex.db"), 0),
            SourceRead::Skipped(SkipReason::SchemaDrift(_))
        ));

        let other = TempDir::new().unwrap();
        codex_db(&other, "CREATE TABLE threads (id TEXT);");
        assert!(matches!(
            read_sql_usage(&other.path().join("codex.db"), 0),
            SourceRead::Skipped(SkipReason::SchemaDrift(_))
        ));
    }
}
