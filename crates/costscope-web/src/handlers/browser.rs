//! Browser extension duration and visit reports.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use costscope_core::metrics::{browser_labels, domain_cost_labels, Counter};
use serde::Serialize;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use super::{number_field, parse_batch, str_field};
use crate::error::ApiError;
use crate::AppState;

/// `usage_source` label value for extension reports
pub const EXTENSION_USAGE_SOURCE: &str = "extension";

const DEFAULT_BROWSER: &str = "chrome";

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub processed: usize,
}

/// POST /metrics/browser
///
/// Body `{ "events": [{ domain, duration_seconds, visit_count, browser }] }`.
/// Untracked domains and malformed events are skipped.
pub async fn receive_browser_metrics(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    if !state.extension_connected.swap(true, Ordering::Relaxed) {
        info!("browser extension connected");
    }

    let events = parse_batch(&body, state.max_batch_size)?;

    for event in &events {
        let Some(event) = event.as_object() else {
            continue;
        };
        let Some(domain) = str_field(event, "domain").filter(|d| !d.is_empty()) else {
            continue;
        };
        let Some(duration) = number_field(event, "duration_seconds") else {
            continue;
        };
        let visits = number_field(event, "visit_count").unwrap_or(0.0);

        let Some(entry) = state.catalog.domain(domain) else {
            continue;
        };
        let browser = str_field(event, "browser").unwrap_or(DEFAULT_BROWSER);
        let labels = browser_labels(entry, browser, EXTENSION_USAGE_SOURCE);

        if duration > 0.0 {
            state.sink.add(Counter::BrowserActiveDuration, duration, &labels);
        }
        if visits > 0.0 {
            state.sink.add(Counter::BrowserVisitCount, visits, &labels);
        }
        if entry.cost_per_hour > 0.0 && duration > 0.0 {
            let cost = entry.cost_per_hour * (duration / 3600.0);
            state
                .sink
                .add(Counter::BrowserEstimatedCost, cost, &domain_cost_labels(entry));
        }

        debug!("extension: {} {duration:.0}s, {visits} visits", entry.domain);
    }

    Ok(Json(IngestResponse {
        status: "ok",
        processed: events.len(),
    }))
}
