//! Recovery strategies and the per-kind strategy registry

use crate::error_recovery::classifier::{ErrorKind, RawError};
use crate::utils::{safe_read_lock, safe_write_lock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Result of a single recovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The underlying problem is resolved
    Recovered,
    /// The attempt completed but did not resolve the problem
    NotRecovered,
    /// The attempt itself failed
    Failed(String),
}

impl RecoveryOutcome {
    pub fn failed<S: Into<String>>(reason: S) -> Self {
        RecoveryOutcome::Failed(reason.into())
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered)
    }
}

impl From<bool> for RecoveryOutcome {
    fn from(recovered: bool) -> Self {
        if recovered {
            RecoveryOutcome::Recovered
        } else {
            RecoveryOutcome::NotRecovered
        }
    }
}

impl<E: std::fmt::Display> From<Result<bool, E>> for RecoveryOutcome {
    fn from(result: Result<bool, E>) -> Self {
        match result {
            Ok(recovered) => recovered.into(),
            Err(e) => RecoveryOutcome::Failed(e.to_string()),
        }
    }
}

/// Policy pairing a retry budget with an async recovery action for one kind
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Number of attempts the executor may make; zero disables recovery
    fn max_retries(&self) -> u32;

    /// Checked once before the first attempt; `Some(reason)` aborts with zero attempts
    async fn preflight(&self, _error: &RawError) -> Option<String> {
        None
    }

    /// Run attempt number `attempt` (1-based)
    async fn recover(&self, error: &RawError, attempt: u32) -> RecoveryOutcome;
}

/// Strategy for kinds that must never be retried
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetryStrategy;

#[async_trait]
impl RecoveryStrategy for NoRetryStrategy {
    fn max_retries(&self) -> u32 {
        0
    }

    async fn recover(&self, _error: &RawError, _attempt: u32) -> RecoveryOutcome {
        RecoveryOutcome::NotRecovered
    }
}

/// Strategy built from a closure
///
/// ```ignore
/// let strategy = FnStrategy::new(2, |_error, attempt| async move {
///     RecoveryOutcome::from(attempt > 1)
/// });
/// ```
pub struct FnStrategy<F> {
    max_retries: u32,
    recover: F,
}

impl<F> FnStrategy<F> {
    pub fn new(max_retries: u32, recover: F) -> Self {
        Self {
            max_retries,
            recover,
        }
    }
}

#[async_trait]
impl<F, Fut> RecoveryStrategy for FnStrategy<F>
where
    F: Fn(RawError, u32) -> Fut + Send + Sync,
    Fut: Future<Output = RecoveryOutcome> + Send,
{
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn recover(&self, error: &RawError, attempt: u32) -> RecoveryOutcome {
        (self.recover)(error.clone(), attempt).await
    }
}

/// Mapping from kind to strategy, mutable at runtime
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<ErrorKind, Arc<dyn RecoveryStrategy>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the strategy for `kind`
    pub fn insert(&self, kind: ErrorKind, strategy: Arc<dyn RecoveryStrategy>) {
        debug!(
            "Registering recovery strategy for {} (max_retries={})",
            kind,
            strategy.max_retries()
        );
        safe_write_lock(&self.strategies, "StrategyRegistry::insert").insert(kind, strategy);
    }

    /// Remove the strategy for `kind`; returns whether one was registered
    pub fn remove(&self, kind: &ErrorKind) -> bool {
        safe_write_lock(&self.strategies, "StrategyRegistry::remove")
            .remove(kind)
            .is_some()
    }

    /// Snapshot of the strategy for `kind`; the lock is released on return
    pub fn get(&self, kind: &ErrorKind) -> Option<Arc<dyn RecoveryStrategy>> {
        safe_read_lock(&self.strategies, "StrategyRegistry::get")
            .get(kind)
            .cloned()
    }

    pub fn contains(&self, kind: &ErrorKind) -> bool {
        safe_read_lock(&self.strategies, "StrategyRegistry::contains").contains_key(kind)
    }

    /// Registered kinds, sorted by name
    pub fn kinds(&self) -> Vec<ErrorKind> {
        let mut kinds: Vec<ErrorKind> =
            safe_read_lock(&self.strategies, "StrategyRegistry::kinds")
                .keys()
                .cloned()
                .collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_strategy() {
        let strategy = FnStrategy::new(2, |_error: RawError, attempt: u32| async move {
            RecoveryOutcome::from(attempt == 2)
        });

        let error = RawError::new("boom");
        assert_eq!(strategy.max_retries(), 2);
        assert_eq!(strategy.preflight(&error).await, None);
        assert_eq!(strategy.recover(&error, 1).await, RecoveryOutcome::NotRecovered);
        assert_eq!(strategy.recover(&error, 2).await, RecoveryOutcome::Recovered);
    }

    #[test]
    fn test_registry_insert_replace_remove() {
        let registry = StrategyRegistry::new();
        let kind = ErrorKind::custom("payment");

        registry.insert(kind.clone(), Arc::new(NoRetryStrategy));
        registry.insert(ErrorKind::Network, Arc::new(NoRetryStrategy));
        assert_eq!(registry.kinds(), vec![ErrorKind::Network, kind.clone()]);

        registry.insert(
            kind.clone(),
            Arc::new(FnStrategy::new(3, |_e: RawError, _a: u32| async {
                RecoveryOutcome::Recovered
            })),
        );
        assert_eq!(registry.get(&kind).map(|s| s.max_retries()), Some(3));

        assert!(registry.remove(&kind));
        assert!(!registry.remove(&kind));
        assert!(registry.get(&kind).is_none());
    }

    #[test]
    fn test_outcome_conversions() {
        assert!(RecoveryOutcome::from(true).is_recovered());
        let failed: RecoveryOutcome = Err::<bool, _>("probe refused").into();
        assert_eq!(failed, RecoveryOutcome::failed("probe refused"));
    }
}
