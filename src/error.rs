//! Error types for the error recovery engine
//!
//! `handle_error` itself is infallible; these errors cover the fallible
//! plumbing around it (configuration, transport probes, the key/value store,
//! reporters) and end up either in logs or in a `HandleResult`'s `error`.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, HandlerError>;

/// Internal error type of the engine
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport (HTTP probe) errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key/value store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Reporter failures
    #[error("Reporter error: {0}")]
    Reporter(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sanitized error representation for structured logs
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedError {
    pub error_type: &'static str,
    pub message: String,
    pub is_retryable: bool,
}

impl HandlerError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a reporter error
    pub fn reporter<S: Into<String>>(msg: S) -> Self {
        Self::Reporter(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Short machine-readable name of the variant
    pub fn error_type(&self) -> &'static str {
        match self {
            HandlerError::Config(_) => "config_error",
            HandlerError::Transport(_) => "transport_error",
            HandlerError::Http(_) => "http_error",
            HandlerError::Json(_) => "json_error",
            HandlerError::Storage(_) => "storage_error",
            HandlerError::Reporter(_) => "reporter_error",
            HandlerError::InvalidInput(_) => "invalid_input_error",
            HandlerError::Timeout(_) => "timeout_error",
            HandlerError::Io(_) => "io_error",
        }
    }

    /// Check if the failure is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Transport(_) | HandlerError::Timeout(_) => true,
            HandlerError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// Create a sanitized version of the error for logging
    pub fn sanitized_error(&self) -> SanitizedError {
        SanitizedError {
            error_type: self.error_type(),
            message: self.to_string(),
            is_retryable: self.is_retryable(),
        }
    }
}
