//! Error types and HTTP response conversion

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the service
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(Box<axum::http::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Authorization error
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limit exceeded, with the time until the caller may retry
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Time until the next request would be admitted
        retry_after: Duration,
    },

    /// A gzip-encoded body could not be decoded
    #[error("Malformed compressed payload: {0}")]
    Decompression(String),

    /// Encoding an outgoing body failed
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Body exceeds the configured size ceiling
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Work abandoned because the request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// External service error (502)
    #[error("External service error: {0}")]
    External(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) | Error::Io(_) | Error::Compression(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Http(_) | Error::BadRequest(_) | Error::Decompression(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            // nginx's "client closed request"; nobody is left to read it
            Error::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::External(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Error::Decompression(_) => "DECOMPRESSION_FAILED",
            Error::Compression(_) => "COMPRESSION_FAILED",
            Error::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Error::Cancelled => "REQUEST_CANCELLED",
            Error::External(_) => "EXTERNAL_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            Error::Config(e) => e.to_string(),
            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                "I/O operation failed".to_string()
            }
            Error::Compression(msg) => {
                tracing::error!("Compression error: {}", msg);
                "Response encoding failed".to_string()
            }
            Error::External(msg) => {
                tracing::error!("External service error: {}", msg);
                "External service unavailable".to_string()
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            Error::Cancelled => {
                tracing::debug!("Request cancelled before completion");
                "Request cancelled".to_string()
            }
            Error::RateLimitExceeded { .. } => "Too many requests".to_string(),
            Error::Http(e) => e.to_string(),
            Error::Unauthorized(msg)
            | Error::Forbidden(msg)
            | Error::NotFound(msg)
            | Error::BadRequest(msg)
            | Error::Decompression(msg)
            | Error::PayloadTooLarge(msg) => msg.clone(),
        };

        let mut response =
            (status, Json(ErrorResponse::with_code(status, code, message))).into_response();

        if let Error::RateLimitExceeded { retry_after } = self {
            // Round up so clients never retry before the window opens
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        response
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<axum::http::Error> for Error {
    fn from(err: axum::http::Error) -> Self {
        Error::Http(Box::new(err))
    }
}
