//! Error types for Project Forms
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! The OAuth endpoints use their own `OAuthError`, whose body shape
//! is part of their public contract.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::github::GitHubError;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// GitHub API error (502, or 401 when the token was rejected)
    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/decryption error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
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
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::GitHub(GitHubError::Unauthorized) => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "github_unauthorized",
            ),
            AppError::GitHub(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "github"),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Encryption(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Encryption error".to_string(),
                "encryption",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of an OAuth endpoint
///
/// Rendered as `400 {"error": message}` with a permissive CORS header,
/// the shape OAuth clients of these endpoints expect.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Request body was not valid JSON
    #[error("request error")]
    MalformedBody,

    /// A required parameter was missing
    #[error("\"{0}\" parameter is required")]
    MissingParameter(&'static str),

    /// The Authorization header was missing or empty
    #[error("\"Authorization\" header is required")]
    MissingAuthorization,

    /// GitHub redirected back with an error
    #[error("{error} {description}")]
    Denied { error: String, description: String },

    /// GitHub rejected the request
    #[error("{0}")]
    GitHub(#[from] GitHubError),

    /// Any other failure with a message safe to return
    #[error("{0}")]
    Other(String),
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&["oauth", "oauth"]).inc();

        let mut response = (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}
