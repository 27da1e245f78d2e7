//! Process snapshot entries.

use serde::{Deserialize, Serialize};

/// One OS process as seen by a [`ProcessSource`](crate::ports::process::ProcessSource).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Executable path, when the OS allows reading it
    pub exe: Option<String>,
    /// Command-line arguments including argv[0]
    #[serde(default)]
    pub cmdline: Vec<String>,
    /// CPU usage since the previous refresh (%)
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

impl ProcessInfo {
    /// Minimal process entry (tests and subprocess parsers)
    pub fn named(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resident memory in MiB
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}
