//! Process table snapshots.
//!
//! `ProcessSource` port implementation backed by sysinfo.

use async_trait::async_trait;
use costscope_core::error::CoreError;
use costscope_core::models::process::ProcessInfo;
use costscope_core::ports::process::ProcessSource;
use std::sync::{Arc, Mutex};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

/// Process table reader. Keeps one `System` alive between snapshots so
/// per-process CPU usage has a baseline.
pub struct SysinfoProcessSource {
    sys: Arc<Mutex<System>>,
}

impl SysinfoProcessSource {
    pub fn new() -> Self {
        Self {
            sys: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_cpu()
        .with_memory()
        .with_exe(UpdateKind::OnlyIfNotSet)
        .with_cmd(UpdateKind::OnlyIfNotSet)
}

fn read_processes(sys: &Mutex<System>) -> Result<Vec<ProcessInfo>, CoreError> {
    let mut sys = sys
        .lock()
        .map_err(|e| CoreError::Internal(format!("process table lock poisoned: {e}")))?;
    // also drops processes that exited since the last refresh
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

    let processes: Vec<ProcessInfo> = sys
        .processes()
        .values()
        .map(|p| ProcessInfo {
            pid: p.pid().as_u32(),
            name: p.name().to_string_lossy().to_string(),
            exe: p.exe().map(|path| path.to_string_lossy().to_string()),
            cmdline: p
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect(),
            cpu_percent: p.cpu_usage(),
            memory_bytes: p.memory(),
        })
        .collect();

    debug!("process snapshot: {} entries", processes.len());
    Ok(processes)
}

#[async_trait]
impl ProcessSource for SysinfoProcessSource {
    async fn snapshot(&self) -> Result<Vec<ProcessInfo>, CoreError> {
        let sys = Arc::clone(&self.sys);
        tokio::task::spawn_blocking(move || read_processes(&sys))
            .await
            .map_err(|e| CoreError::Internal(format!("process snapshot task failed: {e}")))?
    }
}
