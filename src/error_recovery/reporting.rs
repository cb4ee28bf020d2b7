//! Reporter fan-out
//!
//! Every handled error is offered to all registered reporters concurrently.
//! A failing reporter is logged and otherwise ignored: it neither stops the
//! other reporters nor the recovery that follows.

use crate::error::{HandlerError, Result, SanitizedError};
use crate::error_recovery::record::ErrorRecord;
use crate::ports::{ProbeRequest, Transport};
use crate::utils::{safe_read_lock, safe_write_lock};
use async_trait::async_trait;
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// External callback notified of every handled error
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, record: &ErrorRecord) -> Result<()>;

    /// Name used in diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Reporter built from a closure
pub struct FnReporter<F> {
    name: String,
    report: F,
}

impl<F> FnReporter<F> {
    pub fn new<S: Into<String>>(name: S, report: F) -> Self {
        Self {
            name: name.into(),
            report,
        }
    }
}

#[async_trait]
impl<F, Fut> Reporter for FnReporter<F>
where
    F: Fn(ErrorRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn report(&self, record: &ErrorRecord) -> Result<()> {
        (self.report)(record.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes one structured log line per handled error
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn report(&self, record: &ErrorRecord) -> Result<()> {
        warn!(
            error_id = record.id(),
            kind = %record.kind(),
            url = record.url(),
            timestamp = %record.timestamp_iso(),
            "Handled error: {}",
            record.message()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Ships records as JSON to a collection endpoint
pub struct HttpReporter {
    endpoint: String,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl HttpReporter {
    pub fn new<S: Into<String>>(endpoint: S, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            timeout,
        }
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report(&self, record: &ErrorRecord) -> Result<()> {
        let body = serde_json::to_value(record)?;
        let response = self
            .transport
            .send(
                ProbeRequest::post(self.endpoint.clone())
                    .with_json(body)
                    .with_timeout(self.timeout),
            )
            .await?;

        if response.is_success() {
            debug!("Reported error {} to {}", record.id(), self.endpoint);
            Ok(())
        } else {
            Err(HandlerError::reporter(format!(
                "{} rejected report with status {}",
                self.endpoint, response.status
            )))
        }
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

/// Ordered set of reporters, unique by pointer identity
#[derive(Default)]
pub struct ReporterSet {
    reporters: RwLock<Vec<Arc<dyn Reporter>>>,
}

fn same_reporter(a: &Arc<dyn Reporter>, b: &Arc<dyn Reporter>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl ReporterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter; returns false if this exact reporter is already registered
    pub fn add(&self, reporter: Arc<dyn Reporter>) -> bool {
        let mut reporters = safe_write_lock(&self.reporters, "ReporterSet::add");
        if reporters.iter().any(|r| same_reporter(r, &reporter)) {
            return false;
        }
        info!("Registered error reporter {}", reporter.name());
        reporters.push(reporter);
        true
    }

    /// Remove a reporter; returns whether it was registered
    pub fn remove(&self, reporter: &Arc<dyn Reporter>) -> bool {
        let mut reporters = safe_write_lock(&self.reporters, "ReporterSet::remove");
        let before = reporters.len();
        reporters.retain(|r| !same_reporter(r, reporter));
        before != reporters.len()
    }

    pub fn len(&self) -> usize {
        safe_read_lock(&self.reporters, "ReporterSet::len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `record` to every reporter concurrently; returns the number of failures
    pub async fn notify(&self, record: &ErrorRecord) -> Vec<SanitizedError> {
        let reporters = safe_read_lock(&self.reporters, "ReporterSet::notify").clone();
        if reporters.is_empty() {
            return Vec::new();
        }

        let results = join_all(reporters.iter().map(|reporter| async move {
            (reporter.name().to_string(), reporter.report(record).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e.sanitized_error())))
            .map(|(name, failure)| {
                warn!(
                    reporter = name.as_str(),
                    error_id = record.id(),
                    error_type = failure.error_type,
                    retryable = failure.is_retryable,
                    "Error reporter failed: {}",
                    failure.message
                );
                failure
            })
            .collect()
    }
}

impl std::fmt::Debug for ReporterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterSet")
            .field("len", &self.len())
            .finish()
    }
}
