//! Error handler for converting AppError to HTTP responses.
//!
//! Every error leaves the API as a JSON [`ErrorResponse`]. Server-side
//! failures are logged with their source chain and reported to the client
//! with a sanitised message.

use axum::{
    Json,
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use super::RequestId;
use crate::api::dto::ErrorResponse;
use crate::error::AppError;

/// HTTP status for each [`AppError`] variant.
pub fn error_status(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Duplicate { .. } | AppError::Conflict { .. } => StatusCode::CONFLICT,
        AppError::Validation { .. }
        | AppError::ValidationErrors { .. }
        | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Database { .. } | AppError::Configuration { .. } | AppError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_body(error: &AppError) -> ErrorResponse {
    let code = error.code();
    match error {
        AppError::NotFound { entity, field, value } => ErrorResponse::new(
            code,
            format!("{} with {} '{}' not found", entity, field, value),
        )
        .with_details(json!({ "entity": entity, "field": field, "value": value })),
        AppError::Duplicate { entity, field, value } => ErrorResponse::new(
            code,
            format!("{} with {} '{}' already exists", entity, field, value),
        )
        .with_details(json!({ "entity": entity, "field": field, "value": value })),
        AppError::Validation { field, reason } => {
            ErrorResponse::new(code, format!("Validation failed for {}: {}", field, reason))
                .with_details(json!({ "field": field, "reason": reason }))
        }
        AppError::ValidationErrors { errors } => {
            ErrorResponse::new(code, error.to_string()).with_details(json!({ "errors": errors }))
        }
        AppError::BadRequest { message } | AppError::Conflict { message } => {
            ErrorResponse::new(code, message.as_str())
        }
        AppError::Database { operation, .. } => {
            ErrorResponse::new(code, format!("Database operation failed: {}", operation))
        }
        AppError::Configuration { key, .. } => {
            ErrorResponse::new(code, format!("Configuration error: {}", key))
        }
        AppError::ConnectionPool { .. } => {
            ErrorResponse::new(code, "Database connection unavailable")
        }
        AppError::Internal { .. } => ErrorResponse::new(code, "An internal error occurred"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = error_status(&self);
        if status.is_server_error() {
            let cause = std::error::Error::source(&self)
                .map(ToString::to_string)
                .unwrap_or_default();
            error!(code = self.code(), error = %self, cause = %cause, "Request failed");
        } else if status == StatusCode::CONFLICT {
            warn!(error = %self, "Request conflicted with current state");
        }
        (status, Json(error_body(&self))).into_response()
    }
}

/// Rewrites non-JSON error responses (unknown route, wrong method, ...) to
/// the standard [`ErrorResponse`] shape and stamps JSON-less errors with the
/// request id.
pub async fn global_error_handler(request: Request, next: Next) -> Response {
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
    let response = next.run(request).await;
    let status = response.status();

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if is_json {
        return response;
    }

    let (code, message) = match status {
        StatusCode::NOT_FOUND => ("NOT_FOUND", "The requested resource was not found"),
        StatusCode::METHOD_NOT_ALLOWED => {
            ("METHOD_NOT_ALLOWED", "HTTP method not allowed for this endpoint")
        }
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ("UNSUPPORTED_MEDIA_TYPE", "Unsupported media type"),
        StatusCode::PAYLOAD_TOO_LARGE => ("PAYLOAD_TOO_LARGE", "Request payload too large"),
        s if s.is_server_error() => ("INTERNAL_ERROR", "An internal error occurred"),
        _ => ("BAD_REQUEST", "Bad request"),
    };
    let mut body = ErrorResponse::new(code, message);
    if let Some(id) = request_id.as_deref() {
        body = body.with_request_id(id);
    }
    (status, Json(body)).into_response()
}
