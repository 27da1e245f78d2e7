//! API error handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// API error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("internal server error: {0}")]
    Internal(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed body or oversized batch
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Per-client rate limit exceeded
    #[error("too many requests")]
    TooManyRequests,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
            }
        };

        let body = ErrorResponse {
            error: message,
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<costscope_core::error::CoreError> for ApiError {
    fn from(err: costscope_core::error::CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ApiError::BadRequest("Invalid JSON".to_string());
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::TooManyRequests.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::BadRequest(String::new()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
