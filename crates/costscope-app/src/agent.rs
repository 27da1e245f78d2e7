//! Dependency wiring.
//!
//! Builds the metric sink, detectors, scanners, prompt store and ingestion
//! server from an [`AppConfig`].

use anyhow::{Context, Result};
use costscope_core::config::AppConfig;
use costscope_core::metrics::RunningGauge;
use costscope_core::models::platform::HostOs;
use costscope_core::ports::clock::SystemClock;
use costscope_core::ports::metrics::MetricSink;
use costscope_history::browser::sources::{discover_browsers, UserDirs};
use costscope_history::browser::BrowserHistoryScanner;
use costscope_history::shell::{default_history_files, ShellHistoryScanner};
use costscope_history::tokens::{TokenLogPaths, TokenUsageScanner};
use costscope_history::usage::UsageRecorder;
use costscope_monitor::coordinator::DetectionCoordinator;
use costscope_monitor::foreground::NativeForegroundProvider;
use costscope_monitor::process::SysinfoProcessSource;
use costscope_storage::sqlite::SqlitePromptStore;
use costscope_web::{PrometheusSink, WebServer};
use std::sync::Arc;
use tracing::{info, warn};

use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::settings::AppPaths;

/// Everything the binary runs.
pub struct Agent {
    pub scheduler: Scheduler,
    pub web: Option<WebServer>,
    pub exporter: Arc<PrometheusSink>,
}

fn scheduler_config(config: &AppConfig) -> SchedulerConfig {
    SchedulerConfig {
        detector_interval: config.detector_interval(),
        browser_interval: config.browser_interval(),
        shell_interval: config.shell_interval(),
        token_interval: config.token_interval(),
    }
}

/// Wire the agent. Only an invalid catalog or an unusable state directory
/// is fatal; an unavailable prompt store degrades to metrics only.
pub fn build_agent(config: &AppConfig, paths: &AppPaths) -> Result<Agent> {
    let catalog = Arc::new(config.catalog().context("invalid tool catalog")?);
    let os = HostOs::current();
    info!(
        "catalog: {} apps, {} CLI tools, {} domains ({os})",
        catalog.apps.len(),
        catalog.cli_tools.len(),
        catalog.domains.len()
    );

    std::fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("failed to create state dir {}", paths.state_dir.display()))?;

    let exporter = Arc::new(PrometheusSink::new().context("failed to build metric registry")?);
    let sink: Arc<dyn MetricSink> = exporter.clone();

    // detection
    let coordinator = DetectionCoordinator::new(
        &catalog,
        Arc::new(SysinfoProcessSource::new()),
        Arc::new(NativeForegroundProvider::new()),
        sink.clone(),
        config.scan.wsl_enabled,
    );
    let (apps_running, cli_running) = coordinator.running_gauges();
    sink.register_observer(RunningGauge::App, Arc::new(apps_running));
    sink.register_observer(RunningGauge::Cli, Arc::new(cli_running));

    let mut scheduler = Scheduler::new(scheduler_config(config), coordinator);

    // browser history
    let browsers = UserDirs::detect()
        .map(|dirs| discover_browsers(os, &dirs))
        .unwrap_or_default();
    info!(
        "browser history sources: [{}]",
        browsers.iter().map(|b| b.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    scheduler = scheduler.with_browser(BrowserHistoryScanner::new(
        catalog.domains.clone(),
        browsers,
        sink.clone(),
        Arc::new(SystemClock),
    ));

    // shell history
    let shell = ShellHistoryScanner::new(
        catalog.cli_tools.clone(),
        default_history_files(os),
        &paths.state_dir,
        sink.clone(),
    )
    .context("invalid CLI command patterns")?;
    scheduler = scheduler.with_shell(shell);

    // token usage
    let tracking = &config.token_tracking;
    let recorder = tracking.enabled.then(|| usage_recorder(config, paths, sink.clone()));
    if let Some(recorder) = &recorder {
        scheduler = scheduler.with_tokens(TokenUsageScanner::new(
            TokenLogPaths::from_home(&tracking.sources),
            &paths.state_dir,
            recorder.clone(),
        ));
    }

    // ingestion server; without the prompt store it still emits token metrics
    let web = config.web.enabled.then(|| {
        let server = WebServer::new(config.web.clone(), Arc::clone(&catalog), sink.clone())
            .with_exporter(exporter.clone());
        match recorder.clone() {
            Some(recorder) if tracking.sources.browser_extension => server.with_recorder(recorder),
            _ => server,
        }
    });

    Ok(Agent {
        scheduler,
        web,
        exporter,
    })
}

/// Recorder with the SQLite prompt store attached when it opens, after the
/// startup retention cleanup.
fn usage_recorder(
    config: &AppConfig,
    paths: &AppPaths,
    sink: Arc<dyn MetricSink>,
) -> UsageRecorder {
    let tracking = &config.token_tracking;
    let recorder = UsageRecorder::new(sink)
        .with_capture(tracking.capture_prompt_text, tracking.capture_response_text);

    match SqlitePromptStore::open(&paths.prompt_db, tracking.retention_days) {
        Ok(store) => {
            let recorder = recorder.with_store(Arc::new(store));
            match recorder.cleanup_expired() {
                Ok(deleted) => info!("prompt store retention: {deleted} rows removed"),
                Err(e) => warn!("prompt store retention failed: {e}"),
            }
            recorder
        }
        Err(e) => {
            warn!("prompt store unavailable, recording metrics only: {e}");
            recorder
        }
    }
}
