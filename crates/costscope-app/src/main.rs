//! costscope agent binary.

use anyhow::Result;
use clap::Parser;
use costscope_app::agent::build_agent;
use costscope_app::lifecycle::LifecycleManager;
use costscope_app::settings::{load_config, AppPaths};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Local AI usage and cost telemetry agent
#[derive(Parser, Debug)]
#[command(name = "costscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: platform config dir/config.yaml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Ingestion server port
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Directory for scan checkpoints and the prompt database
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Disable the ingestion server
    #[arg(long)]
    no_web: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    let log_filter = format!(
        "costscope={level},costscope_app={level},costscope_core={level},costscope_monitor={level},costscope_history={level},costscope_storage={level},costscope_web={level},tower_http=warn"
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let config_file = args
        .config
        .clone()
        .unwrap_or_else(AppPaths::default_config_file);
    let mut config = load_config(Some(&config_file))?;

    if let Some(port) = args.port {
        config.web.port = port;
    }
    if let Some(dir) = args.state_dir {
        config.state_dir = Some(dir);
    }
    if args.no_web {
        config.web.enabled = false;
    }

    let paths = AppPaths::resolve(&config);
    info!(
        "costscope {} starting (config: {}, state: {})",
        env!("CARGO_PKG_VERSION"),
        config_file.display(),
        paths.state_dir.display()
    );

    let agent = build_agent(&config, &paths)?;
    let lifecycle = LifecycleManager::new();

    let web_task = agent.web.map(|server| {
        info!("ingestion server: {}", server.url());
        let shutdown_rx = lifecycle.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_rx).await {
                error!("ingestion server failed: {e}");
            }
        })
    });

    let shutdown_rx = lifecycle.subscribe();
    let scheduler = agent.scheduler;
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    info!("costscope running (Ctrl+C to stop)");
    lifecycle.wait_for_signal().await;

    if let Err(e) = scheduler_task.await {
        error!("scheduler task failed: {e}");
    }
    if let Some(task) = web_task {
        if let Err(e) = task.await {
            error!("ingestion server task failed: {e}");
        }
    }

    info!("costscope stopped");
    Ok(())
}
