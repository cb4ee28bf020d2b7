//! Client-side error handling and recovery engine
//!
//! Errors raised anywhere in an application are funnelled into a single
//! [`ErrorHandler`], which classifies them, keeps a bounded history, notifies
//! reporters and attempts kind-specific recovery with backoff.
//!
//! # Features
//!
//! - Status- and message-based classification into a closed set of kinds
//!   plus custom kinds
//! - Runtime-extensible recovery strategies with per-kind retry budgets
//! - Cancellable exponential backoff and an optional recovery circuit breaker
//! - Concurrent, failure-isolated reporter fan-out
//! - Error statistics over a configurable recency window
//! - Injected ports (clock, connectivity, transport, store, location)

pub mod config;
pub mod error;
pub mod error_recovery;
pub mod logging;
pub mod ports;
pub mod utils;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use config::{ConfigLoader, HandlerConfig};
pub use error::{HandlerError, Result};
pub use error_recovery::{
    classify_error, Context, ErrorHandler, ErrorHandlerBuilder, ErrorKind, ErrorRecord,
    ErrorStatistics, HandleResult, RawError, RecoveryOutcome, RecoveryStrategy, Reporter,
};
pub use ports::Ports;
