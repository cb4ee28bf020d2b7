//! Error handler orchestration
//!
//! `ErrorHandler` ties the classifier, strategy registry, retry executor,
//! history and reporters together. `handle_error` is the terminal handler:
//! it never fails and never panics, every problem along the way ends up in
//! the returned [`HandleResult`] or in the logs.

use crate::config::HandlerConfig;
use crate::error::Result;
use crate::error_recovery::builtin::default_strategies;
use crate::error_recovery::circuit_breaker::{CircuitBreakerStats, RecoveryCircuitBreaker};
use crate::error_recovery::classifier::{classify_error, ErrorKind, RawError};
use crate::error_recovery::history::HistoryStore;
use crate::error_recovery::record::{Context, ErrorRecord, HandleResult};
use crate::error_recovery::reporting::{HttpReporter, Reporter, ReporterSet, TracingReporter};
use crate::error_recovery::retry_policy::{RetryExecutor, RetryStats};
use crate::error_recovery::statistics::ErrorStatistics;
use crate::error_recovery::strategy::{RecoveryStrategy, StrategyRegistry};
use crate::ports::Ports;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static GLOBAL_HANDLER: OnceCell<ErrorHandler> = OnceCell::new();

/// Builder for [`ErrorHandler`]
#[derive(Debug, Default)]
pub struct ErrorHandlerBuilder {
    config: Option<HandlerConfig>,
    ports: Option<Ports>,
    builtin_strategies: Option<bool>,
}

impl ErrorHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: HandlerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn ports(mut self, ports: Ports) -> Self {
        self.ports = Some(ports);
        self
    }

    /// Start with an empty strategy table
    pub fn without_builtin_strategies(mut self) -> Self {
        self.builtin_strategies = Some(false);
        self
    }

    pub fn build(self) -> Result<ErrorHandler> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let ports = match self.ports {
            Some(ports) => ports,
            None => Ports::system(config.endpoints.probe_timeout, &config.user_agent)?,
        };

        let registry = Arc::new(StrategyRegistry::new());
        if self.builtin_strategies.unwrap_or(true) {
            let endpoints = config.builtin_endpoints()?;
            for (kind, strategy) in default_strategies(&ports, &endpoints) {
                registry.insert(kind, strategy);
            }
        }

        let mut executor =
            RetryExecutor::new(config.retry.clone(), registry.clone(), ports.clock.clone());
        if config.circuit_breaker.enabled {
            executor = executor.with_circuit_breaker(Arc::new(RecoveryCircuitBreaker::new(
                config.circuit_breaker.clone(),
                ports.clock.clone(),
            )));
        }

        let reporters = ReporterSet::new();
        if config.reporting.log_records {
            reporters.add(Arc::new(TracingReporter));
        }
        if let Some(endpoint) = &config.reporting.endpoint {
            reporters.add(Arc::new(HttpReporter::new(
                endpoint.clone(),
                ports.transport.clone(),
                config.endpoints.probe_timeout,
            )));
        }

        info!(
            "Error handler ready: {} strategies, {} reporters, history size {}",
            registry.kinds().len(),
            reporters.len(),
            config.max_history_size
        );

        Ok(ErrorHandler {
            history: HistoryStore::new(config.max_history_size),
            config,
            ports,
            registry,
            executor,
            reporters,
        })
    }
}

/// Classifies, records, reports and recovers from errors
pub struct ErrorHandler {
    config: HandlerConfig,
    ports: Ports,
    registry: Arc<StrategyRegistry>,
    executor: RetryExecutor,
    history: HistoryStore,
    reporters: ReporterSet,
}

impl ErrorHandler {
    pub fn builder() -> ErrorHandlerBuilder {
        ErrorHandlerBuilder::new()
    }

    /// Handler with the built-in strategies and the given ports
    pub fn new(config: HandlerConfig, ports: Ports) -> Result<Self> {
        Self::builder().config(config).ports(ports).build()
    }

    /// Process-wide default instance with system ports
    ///
    /// Initialised on first use; a failed initialisation is retried on the
    /// next call.
    pub fn global() -> Result<&'static ErrorHandler> {
        GLOBAL_HANDLER.get_or_try_init(|| Self::builder().build())
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    /// Handle an error that carries no extra context
    pub async fn handle(&self, error: impl Into<RawError>) -> HandleResult {
        self.handle_error(error, Context::new()).await
    }

    pub async fn handle_error(&self, error: impl Into<RawError>, context: Context) -> HandleResult {
        self.handle_error_with_cancel(error, context, CancellationToken::new())
            .await
    }

    /// Handle an error; cancelling `cancel` aborts any backoff or attempt in flight
    pub async fn handle_error_with_cancel(
        &self,
        error: impl Into<RawError>,
        context: Context,
        cancel: CancellationToken,
    ) -> HandleResult {
        let error = error.into();
        let kind = classify_error(Some(&error));

        let record = ErrorRecord::new(
            error.message(),
            kind.clone(),
            context,
            self.ports.location.current_url(),
            self.config.user_agent.clone(),
            self.ports.clock.now(),
        );
        debug!(
            error_id = record.id(),
            kind = kind.as_str(),
            "Handling error: {}",
            record.message()
        );

        self.history.push(record.clone());

        let failures = self.reporters.notify(&record).await;
        if !failures.is_empty() {
            debug!("{} reporter(s) failed for error {}", failures.len(), record.id());
        }

        let report = self.executor.attempt_recovery(&kind, &error, &cancel).await;
        if !self.history.settle(record.id(), report.recovered) {
            debug!(
                "Error {} left history before recovery finished",
                record.id()
            );
        }

        let mut error_info = record;
        error_info.settle(report.recovered);

        HandleResult {
            error_info,
            recovered: report.recovered,
            attempts: report.attempts,
            strategy: kind,
            error: report.error,
        }
    }

    /// Register a reporter; returns false if it is already registered
    pub fn add_error_reporter(&self, reporter: Arc<dyn Reporter>) -> bool {
        self.reporters.add(reporter)
    }

    /// Returns whether the reporter was registered
    pub fn remove_error_reporter(&self, reporter: &Arc<dyn Reporter>) -> bool {
        let removed = self.reporters.remove(reporter);
        if removed {
            info!("Removed error reporter {}", reporter.name());
        }
        removed
    }

    /// Register or replace the strategy for `kind`
    pub fn add_recovery_strategy(
        &self,
        kind: impl Into<ErrorKind>,
        strategy: Arc<dyn RecoveryStrategy>,
    ) {
        self.registry.insert(kind.into(), strategy);
    }

    /// Returns whether a strategy was registered for `kind`
    pub fn remove_recovery_strategy(&self, kind: &ErrorKind) -> bool {
        let removed = self.registry.remove(kind);
        if !removed {
            warn!("No recovery strategy registered for {} to remove", kind);
        }
        removed
    }

    /// Kinds with a registered strategy, sorted by name
    pub fn get_available_strategies(&self) -> Vec<ErrorKind> {
        self.registry.kinds()
    }

    /// The `limit` most recent records, newest first (all when `None`)
    pub fn get_error_history(&self, limit: Option<usize>) -> Vec<ErrorRecord> {
        self.history.recent(limit)
    }

    pub fn clear_error_history(&self) {
        self.history.clear();
        info!("Error history cleared");
    }

    pub fn get_error_statistics(&self) -> ErrorStatistics {
        ErrorStatistics::compute(
            &self.history.recent(None),
            self.ports.clock.now(),
            self.config.recency_window,
        )
    }

    /// True when strictly more than `threshold` errors fall in the recency window
    pub fn is_error_rate_too_high(&self, threshold: usize) -> bool {
        self.get_error_statistics().rate_exceeds(threshold)
    }

    pub fn retry_stats(&self) -> RetryStats {
        self.executor.get_stats()
    }

    /// Per-kind circuit state; empty when the breaker is disabled
    pub fn circuit_stats(&self) -> HashMap<ErrorKind, CircuitBreakerStats> {
        self.executor
            .circuit_breaker()
            .map(|breaker| breaker.get_stats())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("config", &self.config)
            .field("ports", &self.ports)
            .field("history_len", &self.history.len())
            .field("reporters", &self.reporters.len())
            .finish_non_exhaustive()
    }
}
