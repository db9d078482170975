//! Error types for authgate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error, including constraint violations (409 or 500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Identity provider rejected the exchange or returned unusable data (502)
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    /// Provider email belongs to a user that never linked this provider (409)
    #[error("Account is not linked to the user owning this email")]
    AccountNotLinked,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Not implemented or disabled feature (501)
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Storage constraint that rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Unique,
    ForeignKey,
    Check,
    NotNull,
}

impl AppError {
    /// Classify a storage-layer constraint failure, if this is one
    pub fn constraint_violation(&self) -> Option<ConstraintViolation> {
        let AppError::Database(sqlx::Error::Database(db_error)) = self else {
            return None;
        };

        match db_error.kind() {
            ErrorKind::UniqueViolation => Some(ConstraintViolation::Unique),
            ErrorKind::ForeignKeyViolation => Some(ConstraintViolation::ForeignKey),
            ErrorKind::CheckViolation => Some(ConstraintViolation::Check),
            ErrorKind::NotNullViolation => Some(ConstraintViolation::NotNull),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), "forbidden"),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Database(_) => match self.constraint_violation() {
                Some(ConstraintViolation::Unique) => (
                    StatusCode::CONFLICT,
                    "Record already exists".to_string(),
                    "conflict",
                ),
                Some(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Constraint violation".to_string(),
                    "constraint",
                ),
                None => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    "database",
                ),
            },
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::IdentityProvider(msg) => {
                (StatusCode::BAD_GATEWAY, msg.clone(), "identity_provider")
            }
            AppError::AccountNotLinked => (
                StatusCode::CONFLICT,
                self.to_string(),
                "account_not_linked",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
            AppError::NotImplemented(msg) => {
                (StatusCode::NOT_IMPLEMENTED, msg.clone(), "not_implemented")
            }
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
