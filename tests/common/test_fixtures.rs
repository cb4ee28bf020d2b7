//! Test fixtures and utilities for consistent test setup
//!
//! Provides handlers wired to deterministic ports using rstest fixtures.

use error_recovery_engine::mock::{ManualClock, RecordingLocation, ScriptedTransport};
use error_recovery_engine::ports::{ConnectivitySignal, InMemoryStore, Ports};
use error_recovery_engine::{ErrorHandler, HandlerConfig};
use rstest::*;
use std::sync::Arc;

/// A handler together with handles on every fake it was built from
pub struct TestEnv {
    pub handler: ErrorHandler,
    pub clock: Arc<ManualClock>,
    pub connectivity: Arc<ConnectivitySignal>,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<InMemoryStore>,
    pub location: Arc<RecordingLocation>,
}

impl TestEnv {
    pub fn new(config: HandlerConfig, transport: ScriptedTransport) -> Self {
        let clock = Arc::new(ManualClock::default());
        let connectivity = Arc::new(ConnectivitySignal::default());
        let transport = Arc::new(transport);
        let store = Arc::new(InMemoryStore::new());
        let location = Arc::new(RecordingLocation::default());

        let ports = Ports {
            clock: clock.clone(),
            connectivity: connectivity.clone(),
            transport: transport.clone(),
            store: store.clone(),
            location: location.clone(),
        };
        let handler = ErrorHandler::new(config, ports).expect("valid test configuration");

        Self {
            handler,
            clock,
            connectivity,
            transport,
            store,
            location,
        }
    }

    pub fn with_transport(transport: ScriptedTransport) -> Self {
        Self::new(HandlerConfig::dev_mode(), transport)
    }
}

/// Handler whose probes always succeed
#[fixture]
pub fn healthy_env() -> TestEnv {
    TestEnv::with_transport(ScriptedTransport::healthy())
}

/// Handler keeping only the three most recent records
#[fixture]
pub fn small_history_env() -> TestEnv {
    TestEnv::new(
        HandlerConfig::dev_mode().with_max_history_size(3),
        ScriptedTransport::healthy(),
    )
}
