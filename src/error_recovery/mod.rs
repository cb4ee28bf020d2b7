//! Error classification and recovery
//!
//! Raw errors are classified into an [`ErrorKind`], recorded in a bounded
//! history, offered to every registered reporter and then handed to the
//! recovery strategy registered for their kind.

pub mod builtin;
pub mod circuit_breaker;
pub mod classifier;
pub mod handler;
pub mod history;
pub mod record;
pub mod reporting;
pub mod retry_policy;
pub mod statistics;
pub mod strategy;

// Re-export commonly used types
pub use builtin::{
    default_strategies, AuthenticationStrategy, BuiltinEndpoints, ClientStrategy, NetworkStrategy,
    ServerStrategy, OFFLINE_MESSAGE,
};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerStats, CircuitState, RecoveryCircuitBreaker,
};
pub use classifier::{classify_error, ErrorKind, RawError};
pub use handler::{ErrorHandler, ErrorHandlerBuilder};
pub use history::HistoryStore;
pub use record::{Context, ErrorRecord, HandleResult};
pub use reporting::{FnReporter, HttpReporter, Reporter, ReporterSet, TracingReporter};
pub use retry_policy::{
    BackoffStrategy, JitterConfig, JitterType, RecoveryReport, RetryExecutor, RetryPolicy,
    RetryStats,
};
pub use statistics::ErrorStatistics;
pub use strategy::{FnStrategy, NoRetryStrategy, RecoveryOutcome, RecoveryStrategy, StrategyRegistry};
