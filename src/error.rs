//! # Error Handling
//!
//! Two error families live here:
//!
//! - [`AppError`]: failures of the HTTP surface (config endpoints, webhook).
//!   Implements actix's `ResponseError` so handlers can return it directly.
//! - [`BridgeError`]: failures inside a single call's media bridge. None of
//!   these are fatal to the process; each one is scoped to the call that hit it.
//!
//! ## Bridge Error Taxonomy:
//! - **Parse**: malformed message from either socket. The message is dropped.
//! - **Format**: audio payload violates codec alignment. The frame is dropped.
//! - **Transport**: socket failure on either side. The whole call is torn down.
//! - **Timeout**: the agent socket was not ready in time. The call is abandoned.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by HTTP handlers.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Agent connect timeout must be greater than 0",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    /// Client sent invalid or malformed data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User input failed validation rules
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// JSON parsing errors are almost always the client's fault, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Errors raised while relaying one call.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed JSON, unknown shape, or undecodable base64
    #[error("parse error: {0}")]
    Parse(String),

    /// Audio payload that the codec cannot process
    #[error("format error: {0}")]
    Format(String),

    /// Socket-level failure on the telephony or agent connection
    #[error("transport error: {0}")]
    Transport(String),

    /// The agent connection did not become ready within the bound
    #[error("agent connection not ready after {0:?}")]
    Timeout(Duration),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Parse(err.to_string())
    }
}

impl From<base64::DecodeError> for BridgeError {
    fn from(err: base64::DecodeError) -> Self {
        BridgeError::Parse(format!("invalid base64 payload: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}
