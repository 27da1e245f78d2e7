//! Service description, liveness and extension configuration.

use axum::extract::State;
use axum::Json;
use costscope_core::models::catalog::ApiInterceptPattern;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::AppState;

/// Configuration served to the browser extension
#[derive(Debug, Serialize)]
pub struct ExtensionConfigResponse {
    pub domains: Vec<String>,
    pub api_patterns: Vec<ApiInterceptPattern>,
    /// USD per hour by domain
    pub cost_rates: BTreeMap<String, f64>,
}

/// GET /
pub async fn root() -> Json<Value> {
    debug!("root endpoint visited");
    Json(json!({
        "service": "costscope",
        "status": "running",
        "endpoints": [
            "/health",
            "/metrics/browser",
            "/api/tokens",
            "/api/extension-config",
            "/metrics",
        ],
    }))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// GET /api/extension-config
pub async fn extension_config(State(state): State<AppState>) -> Json<ExtensionConfigResponse> {
    let catalog = &state.catalog;
    Json(ExtensionConfigResponse {
        domains: catalog.domains.iter().map(|d| d.domain.clone()).collect(),
        api_patterns: catalog.api_intercept_patterns.clone(),
        cost_rates: catalog
            .domains
            .iter()
            .map(|d| (d.domain.clone(), d.cost_per_hour))
            .collect(),
    })
}
