//! Error taxonomy and classification
//!
//! Every handled error is mapped onto an [`ErrorKind`] in two stages: an HTTP
//! status code, when present, is authoritative; otherwise the lower-cased
//! message is matched against ordered keyword groups. Anything left over is
//! [`ErrorKind::Unknown`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category label assigned to a handled error
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    Network,
    Authentication,
    Permission,
    Validation,
    Server,
    Client,
    Unknown,
    /// Caller-defined kind, registered through a custom recovery strategy
    Custom(String),
}

impl ErrorKind {
    /// All built-in kinds, in classification priority order
    pub const BUILT_IN: [ErrorKind; 7] = [
        ErrorKind::Network,
        ErrorKind::Authentication,
        ErrorKind::Permission,
        ErrorKind::Validation,
        ErrorKind::Server,
        ErrorKind::Client,
        ErrorKind::Unknown,
    ];

    /// Create a caller-defined kind
    pub fn custom<S: Into<String>>(name: S) -> Self {
        ErrorKind::from(name.into())
    }

    /// Lower-case name used for registry keys and serialization
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Permission => "permission",
            ErrorKind::Validation => "validation",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Unknown => "unknown",
            ErrorKind::Custom(name) => name,
        }
    }

    /// Short message suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "Network connection problem. Please check your internet connection and try again."
            }
            ErrorKind::Authentication => "Your session has expired. Please log in again.",
            ErrorKind::Permission => "You do not have permission to perform this action.",
            ErrorKind::Validation => "Please check your input and try again.",
            ErrorKind::Server => "The server encountered an error. Please try again later.",
            ErrorKind::Client => "Something went wrong in the application. Please refresh the page.",
            ErrorKind::Unknown | ErrorKind::Custom(_) => {
                "An unexpected error occurred. Please try again."
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ErrorKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "network" => ErrorKind::Network,
            "authentication" => ErrorKind::Authentication,
            "permission" => ErrorKind::Permission,
            "validation" => ErrorKind::Validation,
            "server" => ErrorKind::Server,
            "client" => ErrorKind::Client,
            "unknown" => ErrorKind::Unknown,
            _ => ErrorKind::Custom(name),
        }
    }
}

impl From<&str> for ErrorKind {
    fn from(name: &str) -> Self {
        ErrorKind::from(name.to_string())
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// Duck-typed error value handed to the engine
///
/// Both fields are optional; `RawError::default()` stands in for a missing
/// (`null`) error and classifies as [`ErrorKind::Unknown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl RawError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: Some(message.into()),
            status: None,
        }
    }

    /// Error carrying only an HTTP status
    pub fn from_status(status: u16) -> Self {
        Self {
            message: None,
            status: Some(status),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Capture the display text of any error
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(error.to_string())
    }

    /// Message text, empty when absent
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::new(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::new(message)
    }
}

impl From<Option<RawError>> for RawError {
    fn from(error: Option<RawError>) -> Self {
        error.unwrap_or_default()
    }
}

impl From<&reqwest::Error> for RawError {
    fn from(error: &reqwest::Error) -> Self {
        Self {
            message: Some(error.to_string()),
            status: error.status().map(|s| s.as_u16()),
        }
    }
}

impl From<reqwest::Error> for RawError {
    fn from(error: reqwest::Error) -> Self {
        RawError::from(&error)
    }
}

impl From<&crate::error::HandlerError> for RawError {
    fn from(error: &crate::error::HandlerError) -> Self {
        match error {
            crate::error::HandlerError::Http(inner) => RawError::from(inner),
            other => RawError::new(other.to_string()),
        }
    }
}

/// Keyword groups in priority order; the first group with a hit wins
static KEYWORD_GROUPS: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    [
        (ErrorKind::Network, r"network|fetch|timeout"),
        (
            ErrorKind::Authentication,
            r"auth|login|session|token|unauthorized",
        ),
        (ErrorKind::Permission, r"permission|forbidden|access denied"),
        (ErrorKind::Validation, r"validation|invalid|required|format"),
        (ErrorKind::Server, r"server|internal"),
        (
            ErrorKind::Client,
            r"cannot read propert|is not a function|is (null|undefined)|(null|undefined) reference",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::Authentication),
        403 => Some(ErrorKind::Permission),
        400 | 422 => Some(ErrorKind::Validation),
        s if s >= 500 => Some(ErrorKind::Server),
        _ => None,
    }
}

fn classify_message(message: &str) -> Option<ErrorKind> {
    if message.is_empty() {
        return None;
    }

    let message = message.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&message))
        .map(|(kind, _)| kind.clone())
}

/// Classify an error; total over every input, including `None`
pub fn classify_error(error: Option<&RawError>) -> ErrorKind {
    let Some(error) = error else {
        return ErrorKind::Unknown;
    };

    error
        .status
        .and_then(classify_status)
        .or_else(|| classify_message(error.message()))
        .unwrap_or(ErrorKind::Unknown)
}
