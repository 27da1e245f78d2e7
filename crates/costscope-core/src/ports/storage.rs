//! Usage-log persistence port.
//!
//! Implementation: `costscope-storage` (SQLite).

use crate::error::CoreError;
use crate::models::usage::UsageEvent;

/// Durable store for token usage events and captured prompt text.
///
/// Called from blocking scanner threads, so the trait is synchronous.
pub trait PromptStore: Send + Sync {
    /// Persist one event.
    fn insert(&self, event: &UsageEvent) -> Result<(), CoreError>;

    /// Drop rows older than the retention window. Returns the number of
    /// deleted rows.
    fn cleanup_expired(&self) -> Result<usize, CoreError>;
}
