//! # costscope-storage
//!
//! Local prompt store adapter.
//! Persists token usage events (and, when enabled, captured prompt text)
//! in SQLite, manages the schema version and applies the retention window.
//!
//! ## Modules
//! - `sqlite`: prompt store (`PromptStore` implementation)
//! - `migration`: schema migration

pub mod migration;
pub mod sqlite;
