//! Token usage intercepted by the browser extension.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use costscope_core::models::usage::{UsageEvent, UsageSource};
use costscope_core::pricing::estimate_cost;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::browser::IngestResponse;
use super::{number_field, parse_batch, str_field};
use crate::error::ApiError;
use crate::AppState;

const API_INTERCEPT: &str = "api_intercept";

/// POST /api/tokens
///
/// Body `{ "events": [{ type: "api_intercept", tool, model, input_tokens,
/// output_tokens, prompt_text?, response_text? }] }`. Other event types are
/// ignored. Metrics and cost are emitted whether or not a prompt store is
/// configured.
pub async fn receive_token_events(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let events = parse_batch(&body, state.max_batch_size)?;

    let usage: Vec<UsageEvent> = events
        .iter()
        .filter_map(Value::as_object)
        .filter(|event| str_field(event, "type") == Some(API_INTERCEPT))
        .map(intercept_to_usage)
        .collect();
    let processed = usage.len();

    let recorder = state.recorder.clone();

    // the prompt store is synchronous SQLite
    tokio::task::spawn_blocking(move || {
        for event in &usage {
            if let Err(e) = recorder.record(event) {
                warn!("failed to store intercepted prompt: {e}");
            }
            debug!(
                "token intercept: {} model={} in={} out={}",
                event.tool, event.model, event.input_tokens, event.output_tokens
            );
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("token recording task failed: {e}")))?;

    Ok(Json(IngestResponse {
        status: "ok",
        processed,
    }))
}

fn intercept_to_usage(event: &Map<String, Value>) -> UsageEvent {
    let tool = str_field(event, "tool").unwrap_or("unknown").to_string();
    let model = str_field(event, "model").unwrap_or("unknown").to_string();
    let input_tokens = token_count(event, "input_tokens");
    let output_tokens = token_count(event, "output_tokens");

    UsageEvent {
        cost_usd: estimate_cost(&model, input_tokens, output_tokens, 0, 0),
        tool,
        model,
        input_tokens,
        output_tokens,
        cache_creation_tokens: 0,
        cache_read_tokens: 0,
        prompt_text: str_field(event, "prompt_text").map(str::to_string),
        response_text: str_field(event, "response_text").map(str::to_string),
        source: UsageSource::Browser,
        project: None,
    }
}

/// Malformed or negative counts read as zero.
fn token_count(event: &Map<String, Value>, key: &str) -> u64 {
    number_field(event, key)
        .filter(|n| *n > 0.0)
        .map_or(0, |n| n as u64)
}
