//! Per-kind circuit breaker for recovery sequences
//!
//! When recovery for a kind keeps failing, further sequences for that kind are
//! suspended for a cool-down period instead of burning their retry budget
//! against a dependency that is known to be down. After the cool-down one
//! trial sequence is let through (half-open); its outcome closes or reopens
//! the circuit. A trial that ends without an outcome (aborted before its first
//! attempt, or cancelled) puts the circuit back to open for another cool-down.

use crate::error_recovery::classifier::ErrorKind;
use crate::ports::Clock;
use crate::utils::safe_mutex_lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Recovery runs normally
    Closed,
    /// Recovery suspended
    Open,
    /// Cool-down elapsed, next sequence is a trial
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Disabled breakers always allow recovery
    pub enabled: bool,
    /// Failed sequences within `failure_window` before opening
    pub failure_threshold: u32,
    /// Successful trial sequences needed to close from half-open
    pub success_threshold: u32,
    /// Time window for failure counting
    #[serde(with = "humantime_serde")]
    pub failure_window: Duration,
    /// Cool-down while open
    #[serde(with = "humantime_serde")]
    pub open_duration: Duration,
    /// Upper bound for the cool-down after repeated reopening
    #[serde(with = "humantime_serde")]
    pub max_open_duration: Duration,
    /// Multiply the cool-down each time a trial fails
    pub backoff_multiplier: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 5,
            success_threshold: 1,
            failure_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            max_open_duration: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

/// Circuit breaker statistics for one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failed_sequences: u64,
    pub successful_sequences: u64,
    pub blocked_sequences: u64,
    pub circuit_open_count: u64,
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub current_open_duration: Duration,
}

struct KindCircuit {
    state: CircuitState,
    recent_failures: VecDeque<DateTime<Utc>>,
    trial_successes: u32,
    trial_in_flight: bool,
    opened_at: DateTime<Utc>,
    open_duration: Duration,
    stats: CircuitBreakerStats,
}

impl KindCircuit {
    fn new(now: DateTime<Utc>, open_duration: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            recent_failures: VecDeque::new(),
            trial_successes: 0,
            trial_in_flight: false,
            opened_at: now,
            open_duration,
            stats: CircuitBreakerStats {
                state: CircuitState::Closed,
                failed_sequences: 0,
                successful_sequences: 0,
                blocked_sequences: 0,
                circuit_open_count: 0,
                last_failure: None,
                current_open_duration: open_duration,
            },
        }
    }

    fn transition(&mut self, kind: &ErrorKind, new_state: CircuitState, now: DateTime<Utc>) {
        if self.state == new_state {
            return;
        }
        info!(
            "Recovery circuit for {} transitioning {:?} -> {:?}",
            kind, self.state, new_state
        );
        if new_state == CircuitState::Open {
            self.opened_at = now;
            self.stats.circuit_open_count += 1;
        }
        if new_state == CircuitState::HalfOpen {
            self.trial_successes = 0;
        }
        self.trial_in_flight = false;
        self.state = new_state;
        self.stats.state = new_state;
    }
}

/// Circuit breaker keyed by error kind
pub struct RecoveryCircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    circuits: Mutex<HashMap<ErrorKind, KindCircuit>>,
}

impl RecoveryCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn with_circuit<T>(&self, kind: &ErrorKind, f: impl FnOnce(&mut KindCircuit, DateTime<Utc>) -> T) -> T {
        let now = self.clock.now();
        let mut circuits = safe_mutex_lock(&self.circuits, "RecoveryCircuitBreaker");
        let circuit = circuits
            .entry(kind.clone())
            .or_insert_with(|| KindCircuit::new(now, self.config.open_duration));
        f(circuit, now)
    }

    /// Whether a recovery sequence for `kind` may run now
    pub fn should_allow(&self, kind: &ErrorKind) -> bool {
        if !self.config.enabled {
            return true;
        }

        self.with_circuit(kind, |circuit, now| match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen if !circuit.trial_in_flight => {
                circuit.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                circuit.stats.blocked_sequences += 1;
                debug!("Trial recovery for {} already running, blocking sequence", kind);
                false
            }
            CircuitState::Open => {
                let elapsed = (now - circuit.opened_at).to_std().unwrap_or_default();
                if elapsed >= circuit.open_duration {
                    circuit.transition(kind, CircuitState::HalfOpen, now);
                    circuit.trial_in_flight = true;
                    true
                } else {
                    circuit.stats.blocked_sequences += 1;
                    debug!("Recovery circuit open for {}, blocking sequence", kind);
                    false
                }
            }
        })
    }

    /// Record a recovered sequence
    pub fn record_success(&self, kind: &ErrorKind) {
        if !self.config.enabled {
            return;
        }

        let success_threshold = self.config.success_threshold.max(1);
        let base_open = self.config.open_duration;
        self.with_circuit(kind, |circuit, now| {
            circuit.stats.successful_sequences += 1;
            match circuit.state {
                CircuitState::Closed => circuit.recent_failures.clear(),
                CircuitState::HalfOpen => {
                    circuit.trial_in_flight = false;
                    circuit.trial_successes += 1;
                    if circuit.trial_successes >= success_threshold {
                        circuit.recent_failures.clear();
                        circuit.open_duration = base_open;
                        circuit.stats.current_open_duration = base_open;
                        circuit.transition(kind, CircuitState::Closed, now);
                    }
                }
                CircuitState::Open => {
                    warn!("Recovery success recorded while circuit for {} is open", kind);
                }
            }
        });
    }

    /// Record a sequence that exhausted its budget
    pub fn record_failure(&self, kind: &ErrorKind) {
        if !self.config.enabled {
            return;
        }

        let config = self.config.clone();
        self.with_circuit(kind, |circuit, now| {
            circuit.stats.failed_sequences += 1;
            circuit.stats.last_failure = Some(now);

            match circuit.state {
                CircuitState::Closed => {
                    circuit.recent_failures.push_back(now);
                    let window = chrono::Duration::from_std(config.failure_window)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    let cutoff = now - window;
                    while circuit
                        .recent_failures
                        .front()
                        .is_some_and(|failure| *failure < cutoff)
                    {
                        circuit.recent_failures.pop_front();
                    }

                    if circuit.recent_failures.len() as u32 >= config.failure_threshold {
                        error!(
                            "Recovery circuit for {} opened after {} failed sequences",
                            kind,
                            circuit.recent_failures.len()
                        );
                        circuit.transition(kind, CircuitState::Open, now);
                    }
                }
                CircuitState::HalfOpen => {
                    let secs =
                        circuit.open_duration.as_secs_f64() * config.backoff_multiplier.max(1.0);
                    let next = if secs.is_finite() && secs < config.max_open_duration.as_secs_f64() {
                        Duration::from_secs_f64(secs)
                    } else {
                        config.max_open_duration
                    };
                    circuit.open_duration = next;
                    circuit.stats.current_open_duration = next;
                    warn!("Recovery circuit for {} reopened, cool-down {:?}", kind, next);
                    circuit.transition(kind, CircuitState::Open, now);
                }
                CircuitState::Open => debug!("Failure recorded while circuit for {} is open", kind),
            }
        });
    }

    /// Record a sequence that was let through but ended without an outcome
    pub fn record_aborted(&self, kind: &ErrorKind) {
        if !self.config.enabled {
            return;
        }

        self.with_circuit(kind, |circuit, now| {
            if circuit.state == CircuitState::HalfOpen && circuit.trial_in_flight {
                debug!("Trial recovery for {} ended without outcome, reopening", kind);
                // Not a new opening: circuit_open_count stays as is
                circuit.trial_in_flight = false;
                circuit.opened_at = now;
                circuit.state = CircuitState::Open;
                circuit.stats.state = CircuitState::Open;
            }
        });
    }

    /// Current state for `kind`
    pub fn state(&self, kind: &ErrorKind) -> CircuitState {
        safe_mutex_lock(&self.circuits, "RecoveryCircuitBreaker::state")
            .get(kind)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Statistics for every kind the breaker has seen
    pub fn get_stats(&self) -> HashMap<ErrorKind, CircuitBreakerStats> {
        safe_mutex_lock(&self.circuits, "RecoveryCircuitBreaker::get_stats")
            .iter()
            .map(|(kind, circuit)| (kind.clone(), circuit.stats.clone()))
            .collect()
    }

    /// Force every circuit closed
    pub fn reset(&self) {
        safe_mutex_lock(&self.circuits, "RecoveryCircuitBreaker::reset").clear();
    }
}

impl std::fmt::Debug for RecoveryCircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCircuitBreaker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
