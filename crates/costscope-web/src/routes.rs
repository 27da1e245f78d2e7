//! Route table.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::rate_limit;
use crate::AppState;

/// Every route. The ingestion POST routes sit behind the per-IP limiter.
pub fn routes(state: AppState) -> Router<AppState> {
    let ingest = Router::new()
        .route(
            "/metrics/browser",
            post(handlers::browser::receive_browser_metrics),
        )
        .route("/api/tokens", post(handlers::tokens::receive_token_events))
        .route_layer(middleware::from_fn_with_state(
            state,
            rate_limit::limit_by_ip,
        ));

    Router::new()
        .route("/", get(handlers::status::root))
        .route("/health", get(handlers::status::health))
        .route(
            "/api/extension-config",
            get(handlers::status::extension_config),
        )
        .route("/metrics", get(handlers::exposition::render_metrics))
        .merge(ingest)
}
