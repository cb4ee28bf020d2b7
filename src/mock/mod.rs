//! Mock implementations for testing
//!
//! Deterministic stand-ins for the environment ports and for reporters.

use crate::error::{HandlerError, Result};
use crate::error_recovery::record::ErrorRecord;
use crate::error_recovery::reporting::Reporter;
use crate::ports::{Clock, Location, ProbeRequest, ProbeResponse, Transport};
use crate::utils::safe_mutex_lock;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = safe_mutex_lock(&self.now, "ManualClock::advance");
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *safe_mutex_lock(&self.now, "ManualClock::set") = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        )
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *safe_mutex_lock(&self.now, "ManualClock::now")
    }
}

/// Transport answering from a script of canned responses
///
/// Responses are consumed in order; once the script runs out the fallback
/// status is returned. `None` entries in the script simulate a request that
/// never got a response.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Option<u16>>>,
    fallback: Option<u16>,
    requests: Mutex<Vec<ProbeRequest>>,
}

impl ScriptedTransport {
    /// Every request succeeds with 200
    pub fn healthy() -> Self {
        Self::with_fallback(Some(200))
    }

    /// Every request fails without a response
    pub fn unreachable() -> Self {
        Self::with_fallback(None)
    }

    pub fn with_fallback(fallback: Option<u16>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue responses consumed before the fallback applies
    pub fn then(self, responses: impl IntoIterator<Item = Option<u16>>) -> Self {
        safe_mutex_lock(&self.script, "ScriptedTransport::then").extend(responses);
        self
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<ProbeRequest> {
        safe_mutex_lock(&self.requests, "ScriptedTransport::requests").clone()
    }

    pub fn request_count(&self) -> usize {
        safe_mutex_lock(&self.requests, "ScriptedTransport::request_count").len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse> {
        let url = request.url.clone();
        safe_mutex_lock(&self.requests, "ScriptedTransport::send").push(request);

        let next = safe_mutex_lock(&self.script, "ScriptedTransport::send")
            .pop_front()
            .unwrap_or(self.fallback);

        match next {
            Some(status) => Ok(ProbeResponse { status }),
            None => Err(HandlerError::transport(format!("Failed to fetch {url}"))),
        }
    }
}

/// Location that records every navigation target
#[derive(Debug)]
pub struct RecordingLocation {
    current: String,
    navigations: Mutex<Vec<String>>,
}

impl RecordingLocation {
    pub fn new<S: Into<String>>(current: S) -> Self {
        Self {
            current: current.into(),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        safe_mutex_lock(&self.navigations, "RecordingLocation::navigations").clone()
    }
}

impl Default for RecordingLocation {
    fn default() -> Self {
        Self::new("http://localhost/app")
    }
}

impl Location for RecordingLocation {
    fn current_url(&self) -> String {
        self.current.clone()
    }

    fn navigate(&self, target: &str) {
        safe_mutex_lock(&self.navigations, "RecordingLocation::navigate").push(target.to_string());
    }
}

/// Reporter that keeps every record it receives
#[derive(Debug, Default)]
pub struct RecordingReporter {
    records: Mutex<Vec<ErrorRecord>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        safe_mutex_lock(&self.records, "RecordingReporter::records").clone()
    }

    pub fn count(&self) -> usize {
        safe_mutex_lock(&self.records, "RecordingReporter::count").len()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, record: &ErrorRecord) -> Result<()> {
        safe_mutex_lock(&self.records, "RecordingReporter::report").push(record.clone());
        Ok(())
    }
}

/// Reporter that always fails, counting its invocations
#[derive(Debug, Default)]
pub struct FailingReporter {
    calls: AtomicUsize,
}

impl FailingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reporter for FailingReporter {
    async fn report(&self, _record: &ErrorRecord) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::reporter("Reporter failed"))
    }
}
