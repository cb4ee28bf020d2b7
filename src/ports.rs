//! Environment ports consumed by the engine
//!
//! The engine never touches ambient globals: time, connectivity, HTTP probes,
//! the local key/value store and the current location are all injected through
//! these traits. Production implementations live here; deterministic doubles
//! live in [`crate::mock`].

use crate::error::{HandlerError, Result};
use crate::utils::{safe_read_lock, safe_write_lock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Online/offline signal
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by whoever observes the network
#[derive(Debug)]
pub struct ConnectivitySignal {
    online: AtomicBool,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            info!("Connectivity changed: online={}", online);
        }
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// HTTP method used by recovery probes and reporters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Get,
    Head,
    Post,
}

/// A lightweight HTTP request issued by a recovery strategy or reporter
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: ProbeMethod,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl ProbeRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self::new(ProbeMethod::Get, url)
    }

    pub fn head<S: Into<String>>(url: S) -> Self {
        Self::new(ProbeMethod::Head, url)
    }

    pub fn post<S: Into<String>>(url: S) -> Self {
        Self::new(ProbeMethod::Post, url)
    }

    fn new<S: Into<String>>(method: ProbeMethod, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Response summary of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetch-capable transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request; `Err` means the request never produced a response
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse>;
}

/// Transport backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new(default_timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            default_timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse> {
        let builder = match request.method {
            ProbeMethod::Get => self.client.get(&request.url),
            ProbeMethod::Head => self.client.head(&request.url),
            ProbeMethod::Post => self.client.post(&request.url),
        };
        let builder = builder.timeout(request.timeout.unwrap_or(self.default_timeout));
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        debug!("Probe {:?} {}", request.method, request.url);
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HandlerError::timeout(format!("{} timed out", request.url))
            } else {
                HandlerError::from(e)
            }
        })?;

        Ok(ProbeResponse {
            status: response.status().as_u16(),
        })
    }
}

/// Local persisted key/value state (the browser's local storage, a settings file, ...)
pub trait KeyValueStore: Send + Sync {
    fn keys(&self) -> Vec<String>;
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local key/value store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        safe_read_lock(&self.entries, "InMemoryStore::len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryStore {
    fn keys(&self) -> Vec<String> {
        safe_read_lock(&self.entries, "InMemoryStore::keys")
            .keys()
            .cloned()
            .collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        safe_read_lock(&self.entries, "InMemoryStore::get")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        if key.is_empty() {
            return Err(HandlerError::storage("Empty key"));
        }
        safe_write_lock(&self.entries, "InMemoryStore::set").insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        safe_write_lock(&self.entries, "InMemoryStore::remove").remove(key);
        Ok(())
    }
}

/// Current location plus the ability to issue a navigation target
pub trait Location: Send + Sync {
    fn current_url(&self) -> String;
    fn navigate(&self, target: &str);
}

/// Location held in process; navigation just updates the current URL
#[derive(Debug)]
pub struct StaticLocation {
    current: RwLock<String>,
}

impl StaticLocation {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            current: RwLock::new(url.into()),
        }
    }
}

impl Default for StaticLocation {
    fn default() -> Self {
        Self::new("about:blank")
    }
}

impl Location for StaticLocation {
    fn current_url(&self) -> String {
        safe_read_lock(&self.current, "StaticLocation::current_url").clone()
    }

    fn navigate(&self, target: &str) {
        info!("Navigating to {}", target);
        *safe_write_lock(&self.current, "StaticLocation::navigate") = target.to_string();
    }
}

/// Bundle of every port the engine consumes
#[derive(Clone)]
pub struct Ports {
    pub clock: Arc<dyn Clock>,
    pub connectivity: Arc<dyn Connectivity>,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn KeyValueStore>,
    pub location: Arc<dyn Location>,
}

impl Ports {
    /// Production ports: wall clock, online signal, reqwest transport, in-memory store
    pub fn system(probe_timeout: Duration, user_agent: &str) -> Result<Self> {
        Ok(Self {
            clock: Arc::new(SystemClock),
            connectivity: Arc::new(ConnectivitySignal::default()),
            transport: Arc::new(HttpTransport::new(probe_timeout, user_agent)?),
            store: Arc::new(InMemoryStore::new()),
            location: Arc::new(StaticLocation::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_location(mut self, location: Arc<dyn Location>) -> Self {
        self.location = location;
        self
    }
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ports")
            .field("online", &self.connectivity.is_online())
            .field("location", &self.location.current_url())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_signal() {
        let signal = ConnectivitySignal::default();
        assert!(signal.is_online());
        signal.set_online(false);
        assert!(!signal.is_online());
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryStore::new();
        store.set("theme", "\"dark\"".to_string()).unwrap();
        store.set("layout", "{broken".to_string()).unwrap();

        assert_eq!(store.keys(), vec!["layout".to_string(), "theme".to_string()]);
        store.remove("layout").unwrap();
        assert_eq!(store.get("layout"), None);
        assert_eq!(store.len(), 1);
        assert!(store.set("", "x".to_string()).is_err());
    }

    #[test]
    fn test_static_location_navigation() {
        let location = StaticLocation::new("http://localhost/settings");
        location.navigate("/login");
        assert_eq!(location.current_url(), "/login");
    }

    #[test]
    fn test_probe_response_success_range() {
        assert!(ProbeResponse { status: 204 }.is_success());
        assert!(!ProbeResponse { status: 503 }.is_success());
    }
}
