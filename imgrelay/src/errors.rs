use crate::api::models::ErrorResponse;
use crate::image_hosts::ImageHostError;
use crate::token::TokenError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Message returned for every failed upload that is not the client's fault.
pub const UPLOAD_FAILED_MESSAGE: &str = "Error uploading file";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid or missing request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body exceeds the configured upload limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// A local image path supplied by the client could not be read
    #[error("Failed to read image from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image-hosting provider call failed
    #[error(transparent)]
    Upstream(#[from] ImageHostError),

    /// An `/images/{token}` token could not be turned into an upstream URL
    #[error("Invalid image token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The proxied upstream fetch failed before a response arrived
    #[error("Failed to fetch {url}: {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::InvalidToken(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Io { .. } | Error::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Proxy { source, .. } if source.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Error::Proxy { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::Io { .. } | Error::Upstream(_) => UPLOAD_FAILED_MESSAGE.to_string(),
            Error::InvalidToken(_) => "Invalid image token".to_string(),
            Error::Proxy { source, .. } if source.is_timeout() => "Timed out fetching upstream image".to_string(),
            Error::Proxy { .. } => "Failed to fetch upstream image".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Io { .. } | Error::Upstream(_) => {
                tracing::error!("Error uploading file: {:#}", self);
            }
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Proxy { .. } => {
                tracing::warn!("Proxy error: {}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } | Error::InvalidToken(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_keeps_message() {
        let response = Error::BadRequest {
            message: "No image data provided".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, serde_json::json!({"error": "No image data provided"}));
    }

    #[tokio::test]
    async fn test_upload_failures_hide_details() {
        let io = Error::Io {
            path: PathBuf::from("/secret/location.png"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let upstream = Error::Upstream(ImageHostError::MissingField("data.image.url"));

        for err in [io, upstream] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body_json(response).await, serde_json::json!({"error": UPLOAD_FAILED_MESSAGE}));
        }
    }

    #[test]
    fn test_invalid_token_is_client_error() {
        let err = Error::from(TokenError::NotUtf8);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "Invalid image token");
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = Error::from("connect to the moon".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Internal server error");
        assert_eq!(err.to_string(), "Failed to connect to the moon");

        let err = Error::from(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_payload_too_large_status() {
        let err = Error::PayloadTooLarge {
            message: "too big".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
