//! One detection cycle: process snapshot, then desktop → CLI → WSL.
//!
//! The desktop detector's PID registry is produced and consumed within the
//! same cycle, so no lock guards it.

use costscope_core::models::catalog::Catalog;
use costscope_core::models::platform::HostOs;
use costscope_core::ports::metrics::MetricSink;
use costscope_core::ports::process::{ForegroundWindowProvider, ProcessSource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cli::CliDetector;
use crate::dedup::Dedup;
use crate::desktop::DesktopDetector;
use crate::running::{RunningSet, RunningStateGauge};
use crate::wsl::WslDetector;

/// Deadline for one foreground window lookup
pub const FOREGROUND_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the process detectors in dependency order.
pub struct DetectionCoordinator {
    processes: Arc<dyn ProcessSource>,
    foreground: Arc<dyn ForegroundWindowProvider>,
    foreground_timeout: Duration,
    desktop: Option<DesktopDetector>,
    cli: CliDetector,
    wsl: WslDetector,
}

impl DetectionCoordinator {
    /// Full detector chain for `catalog` on the current OS.
    pub fn new(
        catalog: &Catalog,
        processes: Arc<dyn ProcessSource>,
        foreground: Arc<dyn ForegroundWindowProvider>,
        sink: Arc<dyn MetricSink>,
        wsl_enabled: bool,
    ) -> Self {
        let os = HostOs::current();
        Self {
            processes,
            foreground,
            foreground_timeout: FOREGROUND_TIMEOUT,
            desktop: Some(DesktopDetector::new(catalog.apps.clone(), os, sink.clone())),
            cli: CliDetector::new(
                catalog.cli_tools.clone(),
                catalog.desktop_process_names(os),
                os,
                sink,
            ),
            wsl: WslDetector::new(catalog.cli_tools.clone(), wsl_enabled),
        }
    }

    /// Drop the desktop detector; the CLI detector then dedups by name.
    pub fn without_desktop(mut self) -> Self {
        self.desktop = None;
        self
    }

    pub fn with_foreground_timeout(mut self, timeout: Duration) -> Self {
        self.foreground_timeout = timeout;
        self
    }

    /// Observers for `ai_app_running` and `ai_cli_running` (native + WSL).
    pub fn running_gauges(&self) -> (RunningStateGauge, RunningStateGauge) {
        let apps: Vec<RunningSet> = self.desktop.iter().map(|d| d.running_set()).collect();
        (
            RunningStateGauge::new(apps),
            RunningStateGauge::new(vec![self.cli.running_set(), self.wsl.running_set()]),
        )
    }

    /// Run one cycle. A failed process snapshot skips the native detectors
    /// but still runs WSL.
    pub async fn run_cycle(&mut self) {
        let now = Instant::now();

        match self.processes.snapshot().await {
            Ok(processes) => {
                let registry = match self.desktop.as_mut() {
                    Some(desktop) => {
                        let lookup = self.foreground.foreground_app();
                        let foreground =
                            match tokio::time::timeout(self.foreground_timeout, lookup).await {
                                Ok(Ok(app)) => app,
                                Ok(Err(e)) => {
                                    debug!("foreground lookup failed: {e}");
                                    None
                                }
                                Err(_) => {
                                    warn!(
                                        "foreground lookup exceeded {}ms, skipped",
                                        self.foreground_timeout.as_millis()
                                    );
                                    None
                                }
                            };
                        Some(desktop.scan(&processes, foreground.as_deref(), now))
                    }
                    None => None,
                };

                let dedup = match &registry {
                    Some(registry) => Dedup::Pids(registry),
                    None => Dedup::Names,
                };
                let attributed = self.cli.scan(&processes, dedup, now);
                debug!(
                    "detection cycle: {} processes, {} desktop pids, {} cli tools",
                    processes.len(),
                    registry.as_ref().map_or(0, |r| r.len()),
                    attributed.len()
                );
            }
            Err(e) => warn!("process snapshot failed: {e}"),
        }

        self.wsl.scan().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::entry;
    use async_trait::async_trait;
    use costscope_core::error::CoreError;
    use costscope_core::metrics::InMemorySink;
    use costscope_core::models::process::ProcessInfo;
    use costscope_core::ports::metrics::GaugeObserver;
    use parking_lot::Mutex;

    struct FakeProcesses(Mutex<Vec<ProcessInfo>>);

    #[async_trait]
    impl ProcessSource for FakeProcesses {
        async fn snapshot(&self) -> Result<Vec<ProcessInfo>, CoreError> {
            Ok(self.0.lock().clone())
        }
    }

    struct FailingProcesses;

    #[async_trait]
    impl ProcessSource for FailingProcesses {
        async fn snapshot(&self) -> Result<Vec<ProcessInfo>, CoreError> {
            Err(CoreError::Internal("denied".to_string()))
        }
    }

    struct NoForeground;

    #[async_trait]
    impl ForegroundWindowProvider for NoForeground {
        async fn foreground_app(&self) -> Result<Option<String>, CoreError> {
            Ok(None)
        }
    }

    struct StuckForeground;

    #[async_trait]
    impl ForegroundWindowProvider for StuckForeground {
        async fn foreground_app(&self) -> Result<Option<String>, CoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Some("Ollama".to_string()))
        }
    }

    fn catalog() -> Catalog {
        let os_name = match HostOs::current() {
            HostOs::Windows => "Ollama.exe",
            _ => "Ollama",
        };
        let mut app = entry("Ollama", &[], &[], &[]);
        app.rule.process_names.macos = vec![os_name.to_string()];
        app.rule.process_names.windows = vec![os_name.to_string()];
        app.rule.process_names.linux = vec![os_name.to_string()];

        let mut cli = entry("ollama-cli", &[], &[], &[]);
        cli.rule.process_names.macos = vec!["ollama".to_string()];
        cli.rule.process_names.windows = vec!["ollama.exe".to_string()];
        cli.rule.process_names.linux = vec!["ollama".to_string()];

        Catalog {
            apps: vec![app],
            cli_tools: vec![cli],
            ..Catalog::default()
        }
    }

    fn desktop_process() -> ProcessInfo {
        match HostOs::current() {
            HostOs::Windows => ProcessInfo::named(10, "Ollama.exe"),
            _ => ProcessInfo::named(10, "Ollama"),
        }
    }

    #[tokio::test]
    async fn desktop_pid_is_never_counted_as_cli() {
        let sink = Arc::new(InMemorySink::new());
        let source = Arc::new(FakeProcesses(Mutex::new(vec![desktop_process()])));
        let mut coordinator =
            DetectionCoordinator::new(&catalog(), source, Arc::new(NoForeground), sink, false);
        let (apps, clis) = coordinator.running_gauges();

        coordinator.run_cycle().await;

        assert_eq!(apps.observe().len(), 1);
        assert!(clis.observe().is_empty());
    }

    #[tokio::test]
    async fn snapshot_failure_keeps_running() {
        let sink = Arc::new(InMemorySink::new());
        let mut coordinator = DetectionCoordinator::new(
            &catalog(),
            Arc::new(FailingProcesses),
            Arc::new(NoForeground),
            sink,
            false,
        );
        coordinator.run_cycle().await;
        let (apps, clis) = coordinator.running_gauges();
        assert!(apps.observe().is_empty());
        assert!(clis.observe().is_empty());
    }

    #[tokio::test]
    async fn without_desktop_uses_name_dedup() {
        let sink = Arc::new(InMemorySink::new());
        let source = Arc::new(FakeProcesses(Mutex::new(vec![desktop_process()])));
        let mut coordinator =
            DetectionCoordinator::new(&catalog(), source, Arc::new(NoForeground), sink, false)
                .without_desktop();
        let (apps, clis) = coordinator.running_gauges();

        coordinator.run_cycle().await;

        // "Ollama" is a desktop name on this OS, so the CLI detector refuses it
        assert!(apps.observe().is_empty());
        assert!(clis.observe().is_empty());
    }

    #[tokio::test]
    async fn stuck_foreground_lookup_does_not_block_the_cycle() {
        let sink = Arc::new(InMemorySink::new());
        let source = Arc::new(FakeProcesses(Mutex::new(vec![desktop_process()])));
        let mut coordinator =
            DetectionCoordinator::new(&catalog(), source, Arc::new(StuckForeground), sink, false)
                .with_foreground_timeout(Duration::from_millis(50));
        let (apps, _) = coordinator.running_gauges();

        let cycle = tokio::time::timeout(Duration::from_secs(5), coordinator.run_cycle()).await;
        assert!(cycle.is_ok());
        // detection still ran, just without a foreground app
        assert_eq!(apps.observe().len(), 1);
    }
}
