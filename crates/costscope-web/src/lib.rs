//! # costscope-web
//!
//! Local ingestion server.
//! Axum REST endpoints for the browser extension plus the Prometheus
//! exposition route.
//!
//! ## Routes
//! - `GET /`, `GET /health`: service description and liveness
//! - `GET /api/extension-config`: tracked domains, intercept patterns, rates
//! - `POST /metrics/browser`: extension duration and visit reports
//! - `POST /api/tokens`: intercepted token usage
//! - `GET /metrics`: Prometheus text exposition

pub mod error;
pub mod exporter;
pub mod handlers;
pub mod rate_limit;
pub mod routes;

use axum::Router;
use costscope_core::config::WebConfig;
use costscope_core::models::catalog::Catalog;
use costscope_core::ports::metrics::MetricSink;
use costscope_history::usage::UsageRecorder;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use exporter::PrometheusSink;
pub use rate_limit::RateLimiter;

/// Port bind attempts before giving up
const MAX_PORT_ATTEMPTS: u16 = 10;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub sink: Arc<dyn MetricSink>,
    /// Token intake. Metrics only unless a prompt store is attached.
    pub recorder: UsageRecorder,
    /// Source of `GET /metrics`
    pub exporter: Option<Arc<PrometheusSink>>,
    pub limiter: Arc<RateLimiter>,
    pub max_batch_size: usize,
    pub extension_connected: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &WebConfig, catalog: Arc<Catalog>, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            catalog,
            recorder: UsageRecorder::new(Arc::clone(&sink)),
            sink,
            exporter: None,
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_requests,
                config.rate_limit_window(),
            )),
            max_batch_size: config.max_batch_size,
            extension_connected: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Full router with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::routes(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Ingestion server
pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: WebConfig, catalog: Arc<Catalog>, sink: Arc<dyn MetricSink>) -> Self {
        let state = AppState::new(&config, catalog, sink);
        Self { config, state }
    }

    /// Replace the metrics-only recorder, e.g. with one backed by the
    /// prompt store.
    pub fn with_recorder(mut self, recorder: UsageRecorder) -> Self {
        self.state.recorder = recorder;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<PrometheusSink>) -> Self {
        self.state.exporter = Some(exporter);
        self
    }

    /// Serve until `shutdown_rx` turns true.
    ///
    /// Starts at the configured port and tries the next ones while they are
    /// in use, up to [`MAX_PORT_ATTEMPTS`].
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), std::io::Error> {
        let app = build_router(self.state);

        let base_port = self.config.port;
        let mut last_error = None;

        for attempt in 0..MAX_PORT_ATTEMPTS {
            let port = base_port.saturating_add(attempt);
            if port == u16::MAX && attempt > 0 {
                break;
            }

            let addr: SocketAddr = match format!("{}:{}", self.config.bind, port).parse() {
                Ok(a) => a,
                Err(e) => {
                    error!("invalid address {}:{port}: {e}", self.config.bind);
                    return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
                }
            };

            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    if attempt > 0 {
                        warn!("port {base_port} unavailable, using {port}");
                    }
                    info!("ingestion server listening on http://{addr}");

                    axum::serve(
                        listener,
                        app.into_make_service_with_connect_info::<SocketAddr>(),
                    )
                    .with_graceful_shutdown(async move {
                        loop {
                            if *shutdown_rx.borrow() {
                                info!("ingestion server received shutdown signal");
                                break;
                            }
                            if shutdown_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    })
                    .await?;

                    info!("ingestion server stopped");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    warn!("port {port} in use, trying the next one");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!(
                    "ports {}-{} all unavailable",
                    base_port,
                    base_port.saturating_add(MAX_PORT_ATTEMPTS - 1)
                ),
            )
        }))
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.config.bind, self.config.port)
    }
}
