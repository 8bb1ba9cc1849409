//! Error types for vidchat-rs

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Result type alias using [`VidChatError`]
pub type Result<T> = std::result::Result<T, VidChatError>;

/// Main error type for vidchat-rs
#[derive(Debug, Error)]
pub enum VidChatError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Missing or invalid server configuration (e.g. no API key)
    #[error("{0}")]
    Configuration(String),

    /// Malformed or missing request input
    #[error("{0}")]
    Validation(String),

    /// Endpoint called with a method other than POST
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Remote media could not be fetched or is not a video
    #[error("{message}")]
    UpstreamFetch { status: u16, message: String },

    /// Remote media exceeds the configured size ceiling
    #[error("Video exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Failure opening the generation session
    #[error("Failed to start generation: {0}")]
    StreamSetup(String),

    /// Failure after streaming has begun
    #[error("Stream interrupted: {0}")]
    MidStream(String),

    /// Non-success response from the relay server
    #[error("{message}")]
    Relay { status: u16, message: String },

    /// An exchange or media fetch is already in flight
    #[error("Another request is already in progress")]
    Busy,

    /// Nothing to send (blank prompt and no staged video)
    #[error("Nothing to send: enter a prompt or attach a video")]
    EmptySubmission,

    /// Operation cancelled by user
    #[error("Operation cancelled by user")]
    Cancelled,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl VidChatError {
    /// HTTP status used when this error is reported by a relay endpoint
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamFetch { status, .. } | Self::Relay { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for VidChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<String> for VidChatError {
    fn from(s: String) -> Self {
        VidChatError::Other(s)
    }
}

impl From<&str> for VidChatError {
    fn from(s: &str) -> Self {
        VidChatError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            VidChatError::Validation("url is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            VidChatError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            VidChatError::Configuration("no key".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            VidChatError::UpstreamFetch {
                status: 404,
                message: "gone".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_out_of_range_upstream_status_falls_back() {
        let err = VidChatError::UpstreamFetch {
            status: 42,
            message: "weird".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let response = VidChatError::Validation("URL is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "URL is required");
    }
}
