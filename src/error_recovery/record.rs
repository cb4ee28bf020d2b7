//! Error records and handle results

use crate::error_recovery::classifier::ErrorKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form context supplied by the calling code
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Timestamped snapshot of a handled error, as kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    id: String,
    message: String,
    #[serde(rename = "type")]
    kind: ErrorKind,
    context: Context,
    url: String,
    user_agent: String,
    timestamp: DateTime<Utc>,
    handled: bool,
    recovered: bool,
}

impl ErrorRecord {
    /// Create a fresh record with a new unique id; `recovered` starts out false
    pub fn new(
        message: impl Into<String>,
        kind: ErrorKind,
        context: Context,
        url: impl Into<String>,
        user_agent: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            kind,
            context,
            url: url.into(),
            user_agent: user_agent.into(),
            timestamp,
            handled: true,
            recovered: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// ISO-8601 rendering of the timestamp
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn handled(&self) -> bool {
        self.handled
    }

    pub fn recovered(&self) -> bool {
        self.recovered
    }

    /// Only the history store settles the outcome, once per record
    pub(crate) fn settle(&mut self, recovered: bool) {
        self.recovered = recovered;
    }
}

/// Outcome returned to the caller of `handle_error`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleResult {
    pub error_info: ErrorRecord,
    pub recovered: bool,
    pub attempts: u32,
    pub strategy: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
