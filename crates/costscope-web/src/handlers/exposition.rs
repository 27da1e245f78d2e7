//! Prometheus text exposition.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::error::ApiError;
use crate::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
pub async fn render_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let Some(exporter) = state.exporter.as_ref() else {
        return Err(ApiError::NotFound("metric exposition is disabled".to_string()));
    };
    let body = exporter
        .render()
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {e}")))?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body))
}
