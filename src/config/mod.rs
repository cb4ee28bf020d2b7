//! Engine configuration
//!
//! `HandlerConfig` is plain serde data with defaults for every field, so a
//! partial TOML file or a handful of `ERROR_HANDLER__*` environment variables
//! are enough. See [`loader::ConfigLoader`] for how sources are layered.

pub mod loader;

use crate::error::{HandlerError, Result};
use crate::error_recovery::builtin::BuiltinEndpoints;
use crate::error_recovery::circuit_breaker::CircuitBreakerConfig;
use crate::error_recovery::retry_policy::{BackoffStrategy, RetryPolicy};
use crate::utils::{parse_url_safe, resolve_endpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigLoader;

/// Top-level configuration of an `ErrorHandler`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Maximum number of records kept in history
    pub max_history_size: usize,
    /// Window for the `recent_errors` statistic
    #[serde(with = "humantime_serde")]
    pub recency_window: Duration,
    /// Agent string stamped on every record
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub endpoints: EndpointSettings,
    pub reporting: ReportingSettings,
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Endpoints probed by the built-in strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Base URL relative endpoints are resolved against
    pub base_url: String,
    pub connectivity_probe: String,
    pub auth_refresh: String,
    pub health_check: String,
    /// Navigation target after a failed session refresh
    pub login_target: String,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

/// Built-in reporters registered at construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    /// Register a reporter that logs every handled error
    pub log_records: bool,
    /// Collection endpoint for the HTTP reporter
    pub endpoint: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            recency_window: Duration::from_secs(60 * 60),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
            endpoints: EndpointSettings::default(),
            reporting: ReportingSettings::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            connectivity_probe: "/api/health".to_string(),
            auth_refresh: "/api/auth/refresh".to_string(),
            health_check: "/api/health".to_string(),
            login_target: "/login".to_string(),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl HandlerConfig {
    /// Configuration without backoff delays, for tests and demos
    pub fn dev_mode() -> Self {
        Self {
            retry: RetryPolicy::immediate(),
            ..Self::default()
        }
    }

    pub fn with_max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = size;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Validate semantic correctness
    pub fn validate(&self) -> Result<()> {
        if self.max_history_size == 0 {
            return Err(HandlerError::config("max_history_size must be at least 1"));
        }
        if self.recency_window.is_zero() {
            return Err(HandlerError::config("recency_window must be positive"));
        }
        if let BackoffStrategy::Exponential { multiplier } = self.retry.backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(HandlerError::config(format!(
                    "retry.backoff.multiplier must be >= 1.0, got {multiplier}"
                )));
            }
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(HandlerError::config(
                "retry.base_delay must not exceed retry.max_delay",
            ));
        }
        if self.retry.attempt_timeout.is_zero() {
            return Err(HandlerError::config("retry.attempt_timeout must be positive"));
        }
        let jitter_factor = self.retry.jitter.jitter_factor;
        if !(0.0..=1.0).contains(&jitter_factor) {
            return Err(HandlerError::config(format!(
                "retry.jitter.jitter_factor must be within [0, 1], got {jitter_factor}"
            )));
        }

        let breaker = &self.circuit_breaker;
        if breaker.enabled && breaker.failure_threshold == 0 {
            return Err(HandlerError::config(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        if !breaker.backoff_multiplier.is_finite() || breaker.backoff_multiplier < 1.0 {
            return Err(HandlerError::config(format!(
                "circuit_breaker.backoff_multiplier must be >= 1.0, got {}",
                breaker.backoff_multiplier
            )));
        }
        if breaker.open_duration > breaker.max_open_duration {
            return Err(HandlerError::config(
                "circuit_breaker.open_duration must not exceed circuit_breaker.max_open_duration",
            ));
        }

        self.builtin_endpoints()?;
        if let Some(endpoint) = &self.reporting.endpoint {
            parse_url_safe(endpoint, "reporting endpoint")
                .map_err(|e| HandlerError::config(e.to_string()))?;
        }
        Ok(())
    }

    /// Resolve the endpoint settings into absolute URLs
    pub fn builtin_endpoints(&self) -> Result<BuiltinEndpoints> {
        let endpoints = &self.endpoints;
        let resolve = |endpoint: &str, context: &str| {
            resolve_endpoint(&endpoints.base_url, endpoint, context)
                .map(|url| url.to_string())
                .map_err(|e| HandlerError::config(e.to_string()))
        };

        Ok(BuiltinEndpoints {
            connectivity_probe: resolve(&endpoints.connectivity_probe, "connectivity probe")?,
            auth_refresh: resolve(&endpoints.auth_refresh, "auth refresh")?,
            health_check: resolve(&endpoints.health_check, "health check")?,
            login_target: endpoints.login_target.clone(),
            probe_timeout: endpoints.probe_timeout,
        })
    }
}
