//! Four-loop scheduler.
//!
//! One coordinator loop for desktop/CLI/WSL detection plus independent
//! browser-history, shell-history and token-usage loops. A loop finishes
//! its current cycle before waiting for the next tick, so the same scanner
//! never overlaps itself.

use costscope_history::browser::BrowserHistoryScanner;
use costscope_history::shell::ShellHistoryScanner;
use costscope_history::tokens::TokenUsageScanner;
use costscope_monitor::coordinator::DetectionCoordinator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Time allowed for in-flight cycles after the shutdown signal
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Loop intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub detector_interval: Duration,
    pub browser_interval: Duration,
    pub shell_interval: Duration,
    pub token_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            detector_interval: Duration::from_secs(15),
            browser_interval: Duration::from_secs(60),
            shell_interval: Duration::from_secs(3600),
            token_interval: Duration::from_secs(300),
        }
    }
}

/// Detection coordinator plus the optional scanners.
pub struct Scheduler {
    config: SchedulerConfig,
    coordinator: DetectionCoordinator,
    browser: Option<BrowserHistoryScanner>,
    shell: Option<ShellHistoryScanner>,
    tokens: Option<TokenUsageScanner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, coordinator: DetectionCoordinator) -> Self {
        Self {
            config,
            coordinator,
            browser: None,
            shell: None,
            tokens: None,
        }
    }

    pub fn with_browser(mut self, scanner: BrowserHistoryScanner) -> Self {
        self.browser = Some(scanner);
        self
    }

    pub fn with_shell(mut self, scanner: ShellHistoryScanner) -> Self {
        self.shell = Some(scanner);
        self
    }

    pub fn with_tokens(mut self, scanner: TokenUsageScanner) -> Self {
        self.tokens = Some(scanner);
        self
    }

    /// Run every loop until `shutdown_rx` turns true, then give in-flight
    /// cycles [`SHUTDOWN_GRACE`] before aborting them.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "scheduler starting: detector={}s, browser={}s, shell={}s, tokens={}s",
            self.config.detector_interval.as_secs(),
            self.config.browser_interval.as_secs(),
            self.config.shell_interval.as_secs(),
            self.config.token_interval.as_secs(),
        );

        let mut tasks = Vec::with_capacity(4);

        // ============================================================
        // Loop 1: desktop -> CLI -> WSL detection
        // ============================================================
        let mut coordinator = self.coordinator;
        let detector_interval = self.config.detector_interval;
        let mut shutdown1 = shutdown_rx.clone();
        tasks.push((
            "detector",
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(detector_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = interval.tick() => coordinator.run_cycle().await,
                        _ = shutdown1.changed() => {
                            debug!("detector loop stopping");
                            break;
                        }
                    }
                }
            }),
        ));

        // ============================================================
        // Loops 2-4: blocking scanners
        // ============================================================
        if let Some(scanner) = self.browser {
            tasks.push((
                "browser",
                spawn_scan_loop(
                    "browser history",
                    self.config.browser_interval,
                    scanner,
                    |s: &mut BrowserHistoryScanner| {
                        let matched = s.scan();
                        debug!("browser history: {matched} matched visits");
                    },
                    shutdown_rx.clone(),
                ),
            ));
        }

        if let Some(scanner) = self.shell {
            tasks.push((
                "shell",
                spawn_scan_loop(
                    "shell history",
                    self.config.shell_interval,
                    scanner,
                    |s: &mut ShellHistoryScanner| {
                        let commands = s.scan();
                        debug!("shell history: {commands} AI commands");
                    },
                    shutdown_rx.clone(),
                ),
            ));
        }

        if let Some(scanner) = self.tokens {
            tasks.push((
                "tokens",
                spawn_scan_loop(
                    "token usage",
                    self.config.token_interval,
                    scanner,
                    |s: &mut TokenUsageScanner| {
                        let report = s.scan();
                        debug!(
                            "token usage: {} events, {} sources retrying",
                            report.events, report.store_failures
                        );
                    },
                    shutdown_rx.clone(),
                ),
            ));
        }

        // ============================================================
        // Wait for shutdown
        // ============================================================
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        info!("scheduler received shutdown signal");

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for (name, mut task) in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("{name} loop did not stop within the grace period, aborting");
                task.abort();
            }
        }
        info!("scheduler stopped");
    }
}

/// Drive a blocking scanner on the blocking pool at `period`.
fn spawn_scan_loop<S, F>(
    label: &'static str,
    period: Duration,
    scanner: S,
    scan: F,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: Send + 'static,
    F: Fn(&mut S) + Copy + Send + 'static,
{
    let scanner = Arc::new(Mutex::new(scanner));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let scanner = scanner.clone();
                    let result =
                        tokio::task::spawn_blocking(move || scan(&mut *scanner.lock())).await;
                    if let Err(e) = result {
                        error!("{label} scan failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("{label} loop stopping");
                    break;
                }
            }
        }
    })
}
