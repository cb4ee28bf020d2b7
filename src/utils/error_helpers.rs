//! Error handling helper functions
//!
//! Provides safe alternatives to unwrap() for lock acquisition and URL parsing

use crate::error::{HandlerError, Result};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Safely acquire a mutex lock, recovering from poisoned state if necessary
pub fn safe_mutex_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!(
            "Mutex poisoned in {}, recovering with potentially inconsistent state",
            context
        );
        poisoned.into_inner()
    })
}

/// Safely acquire a read lock, recovering from poisoned state if necessary
pub fn safe_read_lock<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned in {} (read), recovering", context);
        poisoned.into_inner()
    })
}

/// Safely acquire a write lock, recovering from poisoned state if necessary
pub fn safe_write_lock<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned in {} (write), recovering", context);
        poisoned.into_inner()
    })
}

/// Parse an absolute http(s) URL with validation and context
pub fn parse_url_safe(url: &str, context: &str) -> Result<url::Url> {
    if url.is_empty() {
        return Err(HandlerError::invalid_input(format!(
            "Empty URL provided for {context}"
        )));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(HandlerError::invalid_input(format!(
            "Invalid URL scheme for {context}: {url}"
        )));
    }

    url::Url::parse(url).map_err(|e| {
        HandlerError::invalid_input(format!("Failed to parse URL for {context} - {url}: {e}"))
    })
}

/// Resolve an endpoint that may be relative (`/api/health`) against a base URL
pub fn resolve_endpoint(base: &str, endpoint: &str, context: &str) -> Result<url::Url> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return parse_url_safe(endpoint, context);
    }

    let base = parse_url_safe(base, context)?;
    base.join(endpoint).map_err(|e| {
        HandlerError::invalid_input(format!(
            "Failed to resolve {context} endpoint '{endpoint}' against {base}: {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_mutex_lock() {
        let mutex = Mutex::new(42);
        {
            let guard = safe_mutex_lock(&mutex, "test");
            assert_eq!(*guard, 42);
        }

        // Simulate poisoned mutex
        let mutex = Mutex::new(100);
        let _ = std::panic::catch_unwind(|| {
            let _guard = mutex.lock().unwrap();
            panic!("Simulated panic");
        });

        let guard = safe_mutex_lock(&mutex, "poisoned test");
        assert_eq!(*guard, 100);
    }

    #[test]
    fn test_safe_rwlock_after_poison() {
        let lock = RwLock::new(vec![1, 2, 3]);
        let _ = std::panic::catch_unwind(|| {
            let _guard = lock.write().unwrap();
            panic!("Simulated panic");
        });

        safe_write_lock(&lock, "poisoned test").push(4);
        assert_eq!(safe_read_lock(&lock, "poisoned test").len(), 4);
    }

    #[test]
    fn test_parse_url_safe() {
        assert!(parse_url_safe("http://example.com", "test").is_ok());
        assert!(parse_url_safe("https://example.com:8080/path", "test").is_ok());

        assert!(parse_url_safe("", "test").is_err());
        assert!(parse_url_safe("not a url", "test").is_err());
        assert!(parse_url_safe("ftp://example.com", "test").is_err());
    }

    #[test]
    fn test_resolve_endpoint() {
        let url = resolve_endpoint("http://localhost:8080", "/api/health", "health").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/health");

        let url =
            resolve_endpoint("http://localhost:8080", "https://status.example.com/", "health")
                .unwrap();
        assert_eq!(url.host_str(), Some("status.example.com"));

        assert!(resolve_endpoint("localhost", "/api/health", "health").is_err());
    }
}
