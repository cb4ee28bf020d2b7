//! Built-in recovery strategies for the standard error kinds

use crate::error_recovery::classifier::{ErrorKind, RawError};
use crate::error_recovery::strategy::{NoRetryStrategy, RecoveryOutcome, RecoveryStrategy};
use crate::ports::{Connectivity, KeyValueStore, Location, ProbeRequest, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message reported when recovery is impossible because the device is offline
pub const OFFLINE_MESSAGE: &str = "No internet connection";

/// Probe connectivity until the network is reachable again
pub struct NetworkStrategy {
    connectivity: Arc<dyn Connectivity>,
    transport: Arc<dyn Transport>,
    probe_url: String,
    timeout: Duration,
}

impl NetworkStrategy {
    pub fn new(
        connectivity: Arc<dyn Connectivity>,
        transport: Arc<dyn Transport>,
        probe_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            connectivity,
            transport,
            probe_url: probe_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RecoveryStrategy for NetworkStrategy {
    fn max_retries(&self) -> u32 {
        3
    }

    async fn preflight(&self, _error: &RawError) -> Option<String> {
        if self.connectivity.is_online() {
            None
        } else {
            Some(OFFLINE_MESSAGE.to_string())
        }
    }

    async fn recover(&self, _error: &RawError, attempt: u32) -> RecoveryOutcome {
        let request = ProbeRequest::head(self.probe_url.clone()).with_timeout(self.timeout);
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => RecoveryOutcome::Recovered,
            Ok(response) => RecoveryOutcome::failed(format!(
                "Connectivity probe returned status {}",
                response.status
            )),
            Err(e) => {
                debug!("Connectivity probe {} failed: {}", attempt, e);
                RecoveryOutcome::failed(e.to_string())
            }
        }
    }
}

/// Refresh the session; send the user to the login page when that fails
pub struct AuthenticationStrategy {
    transport: Arc<dyn Transport>,
    location: Arc<dyn Location>,
    refresh_url: String,
    login_target: String,
    timeout: Duration,
}

impl AuthenticationStrategy {
    pub fn new(
        transport: Arc<dyn Transport>,
        location: Arc<dyn Location>,
        refresh_url: impl Into<String>,
        login_target: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            location,
            refresh_url: refresh_url.into(),
            login_target: login_target.into(),
            timeout,
        }
    }

    fn redirect_to_login(&self) {
        info!("Session refresh failed, redirecting to {}", self.login_target);
        self.location.navigate(&self.login_target);
    }
}

#[async_trait]
impl RecoveryStrategy for AuthenticationStrategy {
    fn max_retries(&self) -> u32 {
        1
    }

    async fn recover(&self, _error: &RawError, _attempt: u32) -> RecoveryOutcome {
        let request = ProbeRequest::post(self.refresh_url.clone()).with_timeout(self.timeout);
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                info!("Session refreshed");
                RecoveryOutcome::Recovered
            }
            Ok(response) => {
                self.redirect_to_login();
                RecoveryOutcome::failed(format!(
                    "Session refresh rejected with status {}",
                    response.status
                ))
            }
            Err(e) => {
                self.redirect_to_login();
                RecoveryOutcome::failed(e.to_string())
            }
        }
    }
}

/// Wait for the backend to report healthy again
pub struct ServerStrategy {
    transport: Arc<dyn Transport>,
    health_url: String,
    timeout: Duration,
}

impl ServerStrategy {
    pub fn new(transport: Arc<dyn Transport>, health_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            health_url: health_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RecoveryStrategy for ServerStrategy {
    fn max_retries(&self) -> u32 {
        1
    }

    async fn recover(&self, _error: &RawError, _attempt: u32) -> RecoveryOutcome {
        let request = ProbeRequest::get(self.health_url.clone()).with_timeout(self.timeout);
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => RecoveryOutcome::Recovered,
            Ok(response) => RecoveryOutcome::failed(format!(
                "Health check returned status {}",
                response.status
            )),
            Err(e) => RecoveryOutcome::failed(e.to_string()),
        }
    }
}

/// Purge malformed persisted state that may be crashing the client
pub struct ClientStrategy {
    store: Arc<dyn KeyValueStore>,
}

impl ClientStrategy {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Remove every entry whose value is not valid JSON; returns the purged keys
    pub fn purge_malformed(&self) -> Vec<String> {
        let mut purged = Vec::new();
        for key in self.store.keys() {
            let Some(value) = self.store.get(&key) else {
                continue;
            };
            if serde_json::from_str::<serde_json::Value>(&value).is_ok() {
                continue;
            }
            match self.store.remove(&key) {
                Ok(()) => purged.push(key),
                Err(e) => warn!("Failed to purge malformed entry '{}': {}", key, e),
            }
        }
        purged
    }
}

#[async_trait]
impl RecoveryStrategy for ClientStrategy {
    fn max_retries(&self) -> u32 {
        1
    }

    async fn recover(&self, _error: &RawError, _attempt: u32) -> RecoveryOutcome {
        let purged = self.purge_malformed();
        if !purged.is_empty() {
            info!("Purged {} malformed stored entries: {:?}", purged.len(), purged);
        }
        RecoveryOutcome::Recovered
    }
}

/// Fully resolved endpoints the built-in strategies talk to
#[derive(Debug, Clone)]
pub struct BuiltinEndpoints {
    pub connectivity_probe: String,
    pub auth_refresh: String,
    pub health_check: String,
    pub login_target: String,
    pub probe_timeout: Duration,
}

/// The default strategy table; `unknown` intentionally has no entry
pub fn default_strategies(
    ports: &crate::ports::Ports,
    endpoints: &BuiltinEndpoints,
) -> Vec<(ErrorKind, Arc<dyn RecoveryStrategy>)> {
    vec![
        (
            ErrorKind::Network,
            Arc::new(NetworkStrategy::new(
                ports.connectivity.clone(),
                ports.transport.clone(),
                endpoints.connectivity_probe.clone(),
                endpoints.probe_timeout,
            )),
        ),
        (
            ErrorKind::Authentication,
            Arc::new(AuthenticationStrategy::new(
                ports.transport.clone(),
                ports.location.clone(),
                endpoints.auth_refresh.clone(),
                endpoints.login_target.clone(),
                endpoints.probe_timeout,
            )),
        ),
        (ErrorKind::Permission, Arc::new(NoRetryStrategy)),
        (ErrorKind::Validation, Arc::new(NoRetryStrategy)),
        (
            ErrorKind::Server,
            Arc::new(ServerStrategy::new(
                ports.transport.clone(),
                endpoints.health_check.clone(),
                endpoints.probe_timeout,
            )),
        ),
        (
            ErrorKind::Client,
            Arc::new(ClientStrategy::new(ports.store.clone())),
        ),
    ]
}
