use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the inventory relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Pool errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy source error: {0}")]
    ProxySource(String),

    #[error("Proxy refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    // Fetch errors
    #[error("All attempts exhausted after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },

    #[error("Target rejected the request with status {status}")]
    TargetRejected { status: u16 },

    #[error("Failed to fetch user's steam inventory: {reason}")]
    InventoryUnavailable { reason: String },

    // Authentication errors
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Unauthorized")]
    InvalidToken,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Request errors
    #[error("{0}")]
    Timeout(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::InvalidProxyAddress(_)
            | RelayError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            RelayError::MissingToken | RelayError::InvalidToken => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            RelayError::InventoryUnavailable { .. } => StatusCode::NOT_FOUND,

            // 502 Bad Gateway
            RelayError::ProxySource(_)
            | RelayError::RefreshFailed(_)
            | RelayError::TargetRejected { .. }
            | RelayError::AttemptsExhausted { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            RelayError::NoProxiesAvailable => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            RelayError::Io(_)
            | RelayError::Http(_)
            | RelayError::MissingEnvVar(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
