//! Process and foreground-window ports.
//!
//! Implementations: `costscope-monitor` (sysinfo + per-OS window APIs).

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::process::ProcessInfo;

/// Snapshot of the OS process table.
#[async_trait]
pub trait ProcessSource: Send + Sync {
    /// Every currently visible process. Processes that vanish or deny
    /// access mid-enumeration are omitted, never reported as an error.
    async fn snapshot(&self) -> Result<Vec<ProcessInfo>, CoreError>;
}

/// Name of the process owning the foreground window.
#[async_trait]
pub trait ForegroundWindowProvider: Send + Sync {
    /// `None` when no window has focus or the platform cannot tell.
    async fn foreground_app(&self) -> Result<Option<String>, CoreError>;
}
