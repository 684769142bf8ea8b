//! Error types for opflow
//!
//! Transport-level failures are the only errors that cross a module
//! boundary as `Err`. Protocol and domain failures are folded into an
//! [`OperationOutcome`](crate::event::OperationOutcome) instead.

use thiserror::Error;

/// Errors raised by a transport collaborator before or while a body is read.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Body read failed: {0}")]
    Body(String),
}

impl TransportError {
    /// Outcome code reported to the consumer for this failure.
    pub fn code(&self) -> String {
        match self {
            TransportError::Http(e) if e.is_timeout() => "TRANSPORT_TIMEOUT".to_string(),
            TransportError::Http(e) if e.is_connect() => "CONNECTION_FAILED".to_string(),
            TransportError::Http(_) => "TRANSPORT_ERROR".to_string(),
            TransportError::Json(_) => "INVALID_JSON".to_string(),
            TransportError::Status { status, .. } => format!("HTTP_{}", status),
            TransportError::InvalidResponse(_) => "INVALID_RESPONSE".to_string(),
            TransportError::Body(_) => "STREAM_INTERRUPTED".to_string(),
        }
    }

    /// Diagnostic message for the consumer.
    ///
    /// For a rejected response the server's own error message is preferred
    /// over the raw body.
    pub fn message(&self) -> String {
        match self {
            TransportError::Status { status, body } => {
                match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(value) => crate::event::fault_from_payload(&value, "").1,
                    Err(_) if body.trim().is_empty() => format!("Request failed with status {}", status),
                    Err(_) => body.trim().to_string(),
                }
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type TransportResult<T> = Result<T, TransportError>;
