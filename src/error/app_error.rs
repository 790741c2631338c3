use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::ConfigError;
use crate::error::DatabaseErrorConverter;
use crate::queue::TransitionError;

/// One failing field of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationFieldError {
    pub field: String,
    pub message: String,
}

/// Application-wide error type.
///
/// Storage and configuration failures keep their source for logging; the
/// HTTP mapping lives in `api::middleware::error_handler`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Unique constraint violation
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Several request fields failed `validator` checks
    #[error("Validation failed for {} field(s)", errors.len())]
    ValidationErrors { errors: Vec<ValidationFieldError> },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// The job is not in a state that permits the action, or it changed
    /// between read and write
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn not_found(
        entity: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        AppError::NotFound {
            entity: entity.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
            AppError::Validation { .. } | AppError::ValidationErrors { .. } => {
                "VALIDATION_ERROR"
            }
            AppError::BadRequest { .. } => "BAD_REQUEST",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::Database { .. } => "DATABASE_ERROR",
            AppError::Configuration { .. } => "CONFIGURATION_ERROR",
            AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<diesel_async::pooled_connection::bb8::RunError> for AppError {
    fn from(error: diesel_async::pooled_connection::bb8::RunError) -> Self {
        AppError::ConnectionPool {
            source: anyhow::Error::from(error),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        let key = error.field().unwrap_or("settings").to_string();
        AppError::Configuration {
            key,
            source: anyhow::Error::new(error),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::ReasonRequired { .. } => {
                AppError::validation("reason", error.to_string())
            }
            TransitionError::InvalidState { .. } => AppError::conflict(error.to_string()),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<ValidationFieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| ValidationFieldError {
                    field: field.to_string(),
                    message: err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string()),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::ValidationErrors { errors: fields }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::delivery::DeliveryStatus;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
        #[validate(range(min = 1))]
        count: i32,
    }

    #[test]
    fn test_validator_errors_are_flattened_and_sorted() {
        let probe = Probe {
            name: String::new(),
            count: 0,
        };
        let err: AppError = probe.validate().unwrap_err().into();
        match err {
            AppError::ValidationErrors { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "count");
                assert_eq!(errors[0].message, "range");
                assert_eq!(errors[1].field, "name");
                assert_eq!(errors[1].message, "must not be empty");
            }
            other => panic!("expected ValidationErrors, got {:?}", other),
        }
    }

    #[test]
    fn test_transition_errors_map_to_conflict_or_validation() {
        let err: AppError = TransitionError::InvalidState {
            action: "retry",
            from: DeliveryStatus::Sent,
        }
        .into();
        assert_eq!(err.code(), "CONFLICT");

        let err: AppError = TransitionError::ReasonRequired { action: "skip" }.into();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "reason"));
    }

    #[test]
    fn test_config_error_keeps_field_as_key() {
        let err: AppError = ConfigError::validation("database.url", "missing").into();
        assert!(matches!(err, AppError::Configuration { ref key, .. } if key == "database.url"));
    }
}
