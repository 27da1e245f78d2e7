//! API handler modules.

pub mod browser;
pub mod exposition;
pub mod status;
pub mod tokens;

use serde_json::{Map, Value};

use crate::error::ApiError;

/// Parse an ingestion body `{ "events": [...] }`.
///
/// Rejects invalid JSON, a body that is not a non-empty object, an
/// `events` field that is not an array, and batches above `max_batch`.
/// A missing `events` field is an empty batch.
pub(crate) fn parse_batch(body: &[u8], max_batch: usize) -> Result<Vec<Value>, ApiError> {
    let data: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))?;

    let object = match data {
        Value::Object(object) if !object.is_empty() => object,
        _ => return Err(ApiError::BadRequest("Invalid JSON".to_string())),
    };

    let events = match object.get("events") {
        None => Vec::new(),
        Some(Value::Array(events)) => events.clone(),
        Some(_) => return Err(ApiError::BadRequest("events must be a list".to_string())),
    };

    if events.len() > max_batch {
        return Err(ApiError::BadRequest(format!(
            "Batch too large: {} events (max {max_batch})",
            events.len()
        )));
    }
    Ok(events)
}

/// Non-negative number field; absent means 0, anything else is `None`.
pub(crate) fn number_field(event: &Map<String, Value>, key: &str) -> Option<f64> {
    match event.get(key) {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(_) => None,
    }
}

pub(crate) fn str_field<'a>(event: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    event.get(key).and_then(Value::as_str)
}
