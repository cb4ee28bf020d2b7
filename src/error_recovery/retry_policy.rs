//! Retry policy and recovery executor
//!
//! The executor looks up the strategy registered for a kind and runs up to
//! `max_retries` recovery attempts, backing off between them. Backoff sleeps
//! and in-flight attempts race a cancellation token, and each attempt is
//! bounded by the policy's attempt timeout.

use crate::error_recovery::circuit_breaker::RecoveryCircuitBreaker;
use crate::error_recovery::classifier::{ErrorKind, RawError};
use crate::error_recovery::strategy::{RecoveryOutcome, StrategyRegistry};
use crate::ports::Clock;
use crate::utils::safe_mutex_lock;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff strategy
    pub backoff: BackoffStrategy,
    /// Jitter configuration
    pub jitter: JitterConfig,
    /// Upper bound for a single recovery attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Enable detailed logging
    pub detailed_logging: bool,
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear backoff (delay grows by `increment` per attempt)
    Linear {
        #[serde(with = "humantime_serde")]
        increment: Duration,
    },
    /// Exponential backoff (delay multiplied each time)
    Exponential { multiplier: f64 },
}

/// Jitter configuration for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    pub enabled: bool,
    pub jitter_type: JitterType,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

/// Types of jitter strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterType {
    /// delay = random(0, delay * factor)
    Full,
    /// delay = delay/2 + random(0, delay/2 * factor)
    Equal,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jitter_type: JitterType::Equal,
            jitter_factor: 0.5,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterConfig::default(),
            attempt_timeout: Duration::from_secs(10),
            detailed_logging: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts, mostly useful in tests
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffStrategy::Fixed,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1);
        let base = match &self.backoff {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear { increment } => {
                self.base_delay.saturating_add(increment.saturating_mul(step))
            }
            BackoffStrategy::Exponential { multiplier } => {
                let factor = (*multiplier).max(1.0).powi(step.min(i32::MAX as u32) as i32);
                let secs = self.base_delay.as_secs_f64() * factor;
                if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    self.max_delay
                }
            }
        };

        let capped = base.min(self.max_delay);
        if self.jitter.enabled {
            self.apply_jitter(capped)
        } else {
            capped
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        // NaN survives clamp and would make gen_range panic
        let factor = if self.jitter.jitter_factor.is_finite() {
            self.jitter.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let delay_secs = delay.as_secs_f64();

        let jittered = match self.jitter.jitter_type {
            JitterType::Full => rng.gen_range(0.0..=delay_secs * factor),
            JitterType::Equal => {
                let half = delay_secs / 2.0;
                half + rng.gen_range(0.0..=half * factor)
            }
        };

        Duration::from_secs_f64(jittered)
    }
}

/// Outcome of a recovery sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub recovered: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecoveryReport {
    fn skipped() -> Self {
        Self {
            recovered: false,
            attempts: 0,
            error: None,
        }
    }

    fn failed(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            recovered: false,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// Cumulative retry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryStats {
    /// Recovery sequences started
    pub total_operations: u64,
    /// Sequences with no strategy or a zero retry budget
    pub skipped: u64,
    /// Sequences aborted by a strategy's preflight check or an open circuit
    pub aborted: u64,
    /// Recovered on the first attempt
    pub successful_first_attempt: u64,
    /// Recovered after at least one retry
    pub successful_after_retry: u64,
    /// Budget exhausted without recovery
    pub failed_after_retries: u64,
    /// Sequences stopped by cancellation
    pub cancelled: u64,
    /// Total backoff waits taken
    pub total_retry_attempts: u64,
    /// Last backoff timestamp
    pub last_retry: Option<DateTime<Utc>>,
}

/// Runs recovery strategies with backoff
pub struct RetryExecutor {
    policy: RetryPolicy,
    registry: Arc<StrategyRegistry>,
    clock: Arc<dyn Clock>,
    breaker: Option<Arc<RecoveryCircuitBreaker>>,
    stats: Mutex<RetryStats>,
}

enum AttemptResult {
    Finished(RecoveryOutcome),
    Cancelled,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, registry: Arc<StrategyRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            registry,
            clock,
            breaker: None,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Attach a circuit breaker consulted before each sequence
    pub fn with_circuit_breaker(mut self, breaker: Arc<RecoveryCircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<RecoveryCircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Run the recovery sequence for `kind`
    pub async fn attempt_recovery(
        &self,
        kind: &ErrorKind,
        error: &RawError,
        cancel: &CancellationToken,
    ) -> RecoveryReport {
        self.update_stats(|stats| stats.total_operations += 1);

        let Some(strategy) = self.registry.get(kind) else {
            debug!("No recovery strategy registered for {}", kind);
            self.update_stats(|stats| stats.skipped += 1);
            return RecoveryReport::skipped();
        };

        let max_retries = strategy.max_retries();
        if max_retries == 0 {
            debug!("Recovery disabled for {} (max_retries = 0)", kind);
            self.update_stats(|stats| stats.skipped += 1);
            return RecoveryReport::skipped();
        }

        if let Some(breaker) = &self.breaker {
            if !breaker.should_allow(kind) {
                warn!("Recovery circuit open for {}, skipping recovery", kind);
                self.update_stats(|stats| stats.aborted += 1);
                return RecoveryReport::failed(
                    0,
                    format!("Recovery suspended: circuit open for {kind}"),
                );
            }
        }

        if let Some(reason) = strategy.preflight(error).await {
            info!("Recovery for {} aborted before first attempt: {}", kind, reason);
            self.update_stats(|stats| stats.aborted += 1);
            if let Some(breaker) = &self.breaker {
                breaker.record_aborted(kind);
            }
            return RecoveryReport::failed(0, reason);
        }

        let mut last_outcome = RecoveryOutcome::NotRecovered;
        for attempt in 1..=max_retries {
            if self.policy.detailed_logging {
                debug!("Recovery attempt {} of {} for {}", attempt, max_retries, kind);
            }

            if cancel.is_cancelled() {
                return self.cancelled(kind, attempt - 1);
            }

            let outcome = match self.run_attempt(strategy.as_ref(), error, attempt, cancel).await {
                AttemptResult::Finished(outcome) => outcome,
                AttemptResult::Cancelled => return self.cancelled(kind, attempt),
            };

            if outcome.is_recovered() {
                self.update_stats(|stats| {
                    if attempt == 1 {
                        stats.successful_first_attempt += 1;
                    } else {
                        stats.successful_after_retry += 1;
                    }
                });
                if let Some(breaker) = &self.breaker {
                    breaker.record_success(kind);
                }
                info!("Recovered from {} error after {} attempt(s)", kind, attempt);
                return RecoveryReport {
                    recovered: true,
                    attempts: attempt,
                    error: None,
                };
            }

            if let RecoveryOutcome::Failed(reason) = &outcome {
                debug!("Recovery attempt {} for {} failed: {}", attempt, kind, reason);
            }
            last_outcome = outcome;

            if attempt < max_retries {
                let delay = self.policy.calculate_delay(attempt);
                self.update_stats(|stats| {
                    stats.total_retry_attempts += 1;
                    stats.last_retry = Some(self.clock.now());
                });
                if self.policy.detailed_logging {
                    debug!(
                        "Retrying {} recovery after {:?} (attempt {}/{})",
                        kind, delay, attempt, max_retries
                    );
                }

                tokio::select! {
                    _ = cancel.cancelled() => return self.cancelled(kind, attempt),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.update_stats(|stats| stats.failed_after_retries += 1);
        if let Some(breaker) = &self.breaker {
            breaker.record_failure(kind);
        }

        let reason = match last_outcome {
            RecoveryOutcome::Failed(reason) => reason,
            _ => format!("Recovery failed after {max_retries} attempt(s)"),
        };
        warn!(
            "Recovery for {} failed after {} attempt(s): {}",
            kind, max_retries, reason
        );
        RecoveryReport::failed(max_retries, reason)
    }

    async fn run_attempt(
        &self,
        strategy: &dyn crate::error_recovery::strategy::RecoveryStrategy,
        error: &RawError,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        tokio::select! {
            _ = cancel.cancelled() => AttemptResult::Cancelled,
            result = tokio::time::timeout(self.policy.attempt_timeout, strategy.recover(error, attempt)) => {
                AttemptResult::Finished(result.unwrap_or_else(|_| {
                    RecoveryOutcome::failed("Recovery attempt timed out")
                }))
            }
        }
    }

    fn cancelled(&self, kind: &ErrorKind, attempts: u32) -> RecoveryReport {
        info!("Recovery for {} cancelled after {} attempt(s)", kind, attempts);
        self.update_stats(|stats| stats.cancelled += 1);
        if let Some(breaker) = &self.breaker {
            breaker.record_aborted(kind);
        }
        RecoveryReport::failed(attempts, "Recovery cancelled")
    }

    fn update_stats(&self, update: impl FnOnce(&mut RetryStats)) {
        update(&mut safe_mutex_lock(&self.stats, "RetryExecutor::stats"));
    }

    /// Get retry statistics
    pub fn get_stats(&self) -> RetryStats {
        safe_mutex_lock(&self.stats, "RetryExecutor::get_stats").clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        *safe_mutex_lock(&self.stats, "RetryExecutor::reset_stats") = RetryStats::default();
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
