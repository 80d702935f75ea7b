//! Error types for the server
//!
//! Errors fall into two groups:
//!
//! - **Startup errors** ([`ConfigError`]): bad arguments, half-specified or
//!   unreadable TLS material. These are fatal; the process exits before any
//!   socket is bound.
//! - **Per-request errors** ([`ApiError`], [`UploadError`], [`StoreError`]):
//!   turned into an HTTP response for the one request that hit them and never
//!   affect other in-flight requests.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fatal configuration problems detected at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Only one half of the certificate/key pair was supplied
    #[error("TLS requires both --ssl-public-key and --ssl-private-key; {missing} is missing")]
    IncompleteTlsPair { missing: &'static str },

    /// A TLS file does not exist or cannot be opened for reading
    #[error("cannot read {}: {source}", path.display())]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A numeric or string option is outside its valid range
    #[error("invalid configuration: {0}")]
    InvalidValue(String),

    /// Certificate or key material could not be turned into a TLS config
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Failures talking to the shared store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the configured timeout
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with something unexpected
    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            StoreError::Unavailable(e.to_string())
        } else if e.is_timeout() {
            StoreError::Unavailable(format!("timeout: {e}"))
        } else {
            StoreError::Protocol(e.to_string())
        }
    }
}

/// Reasons an upload is rejected
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The body is not valid multipart/form-data
    #[error("malformed multipart body: {0}")]
    Malformed(String),

    /// The artifact (or the declared body) exceeds the size limit
    #[error("upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    /// No field carried a file
    #[error("no file field in multipart body")]
    MissingFile,

    /// The file field was empty
    #[error("uploaded file is empty")]
    Empty,

    /// Writing the artifact to disk failed
    #[error("failed to persist upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,
}

/// Errors returned from request handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("service temporarily unavailable")]
    StoreUnavailable(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::StoreUnavailable(e) => tracing::warn!("Store unavailable: {}", e),
            ApiError::Upload(UploadError::Io(e)) => tracing::error!("Upload I/O error: {}", e),
            ApiError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            _ => tracing::debug!("Request rejected with {}: {}", status, self),
        }

        let body = Json(HttpErrorResponse {
            error: self.to_string(),
        });
        let mut response = (status, body).into_response();

        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::RateLimited {
                retry_after_secs: 5
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(StoreError::Timeout(Duration::from_millis(250))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(UploadError::TooLarge { limit: 10 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(UploadError::MissingFile).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after_secs: 59,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "59");
    }

    #[test]
    fn test_config_error_names_missing_flag() {
        let err = ConfigError::IncompleteTlsPair {
            missing: "--ssl-private-key",
        };
        assert!(err.to_string().contains("--ssl-private-key"));
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = ApiError::Internal("disk on fire at /var/secret".to_string());
        assert_eq!(err.to_string(), "internal server error");
    }
}
