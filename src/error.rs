//! Error handling for the livewatch pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Inbound payload could not be resolved into any known shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Detection backend unreachable or answered with a non-2xx status
    #[error("Connectivity lost: {0}")]
    ConnectivityLost(String),

    /// Active feed set is full
    #[error("Maximum of {limit} active feeds reached")]
    CapacityExceeded { limit: usize },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket client error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::MalformedPayload(msg) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD", msg.clone())
            }
            Error::ConnectivityLost(msg) => {
                (StatusCode::BAD_GATEWAY, "CONNECTIVITY_LOST", msg.clone())
            }
            Error::CapacityExceeded { .. } => {
                (StatusCode::CONFLICT, "CAPACITY_EXCEEDED", self.to_string())
            }
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::WebSocket(e) => (StatusCode::BAD_GATEWAY, "WEBSOCKET_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "ok": false,
            "error_code": error_code,
            "error": message
        }));

        (status, body).into_response()
    }
}
