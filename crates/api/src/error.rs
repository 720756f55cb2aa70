//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    /// Malformed or invalid input from the client.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Projection(err) => {
                tracing::error!(error = %err, "projection failure");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string())
            .increment(1);

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    let status = match &err {
        DomainError::AggregateNotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::DuplicateCreation { .. } => StatusCode::CONFLICT,
        // Creation errors are already lifted to the two variants above.
        DomainError::FoodCart(_) => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_concurrency_conflict() => StatusCode::CONFLICT,
        DomainError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DomainError::CorruptedStream { .. }
        | DomainError::EventStore(_)
        | DomainError::Serialization(_) => {
            tracing::error!(error = %err, "command failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
