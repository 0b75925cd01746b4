use std::collections::BTreeMap;
use std::time::Duration;

use axum::http::header::{CONNECTION, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::{CredentialError, TokenError};
use crate::middleware::AddressParseError;

/// Application-wide error type translated into wire responses.
///
/// Components below the middleware chain return their own typed errors
/// ([`CredentialError`], [`TokenError`], [`AddressParseError`]); only this
/// type knows how to render a status code and body.
///
/// # Wire Shape
///
/// - Single errors: `{ "message": "..." }`
/// - Multi-field validation errors: `{ "errors": { "field": "message" } }`
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(BTreeMap<String, String>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A fault that must not leave the connection open for reuse.
    #[error("Unhandled fault: {0}")]
    Fault(String),
}

/// Single-error response body.
#[derive(Serialize)]
struct MessageBody<'a> {
    message: &'a str,
}

/// Multi-field validation response body.
#[derive(Serialize)]
struct ErrorsBody<'a> {
    errors: &'a BTreeMap<String, String>,
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::ConfigError(_) | AppError::Fault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let message = match &self {
            AppError::Validation(errors) => {
                return (status, axum::Json(ErrorsBody { errors })).into_response();
            }
            // Client-facing messages are safe to echo
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.as_str(),
            AppError::RateLimited { .. } => {
                "You're making too many requests. Please wait some time before trying again."
            }
            // Never expose internal details to clients
            AppError::Internal(_) => "Something went wrong in the server",
            AppError::ConfigError(_) => "Service configuration error. Please contact support.",
            AppError::Fault(_) => "Closed connection",
        };

        let mut response = (status, axum::Json(MessageBody { message })).into_response();

        match &self {
            AppError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
            }
            AppError::Fault(_) => {
                response
                    .headers_mut()
                    .insert(CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }

        response
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingHeader | TokenError::MalformedHeader => {
                AppError::BadRequest(err.to_string())
            }
            TokenError::InvalidToken | TokenError::UnknownClaim(_) => {
                AppError::Unauthorized(err.to_string())
            }
            TokenError::Encoding(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        // A stored hash that cannot be decoded is a data fault, not a client error
        AppError::Internal(err.to_string())
    }
}

impl From<AddressParseError> for AppError {
    fn from(err: AddressParseError) -> Self {
        // Surfaced as 500: the peer address format is a deployment mismatch
        AppError::ConfigError(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
