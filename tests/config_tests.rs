//! Configuration loading tests
//!
//! Environment-driven tests run serially with isolated variables.

use error_recovery_engine::error_recovery::BackoffStrategy;
use error_recovery_engine::{ConfigLoader, ErrorHandler, ErrorKind, HandlerConfig, HandlerError};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use temp_env::with_vars;

const FULL_CONFIG: &str = r#"
max_history_size = 20
recency_window = "15m"
user_agent = "checkout-web/2.3"

[retry]
base_delay = "500ms"
max_delay = "10s"
attempt_timeout = "3s"

[retry.backoff]
type = "linear"
increment = "250ms"

[endpoints]
base_url = "https://shop.example.com"
health_check = "/status"
login_target = "/account/login"

[reporting]
log_records = true

[circuit_breaker]
enabled = true
failure_threshold = 3
open_duration = "1m"
"#;

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_full_file() {
    let file = config_file(FULL_CONFIG);
    let config = ConfigLoader::new()
        .without_environment()
        .with_file(file.path())
        .load()
        .unwrap();

    assert_eq!(config.max_history_size, 20);
    assert_eq!(config.recency_window, Duration::from_secs(15 * 60));
    assert_eq!(config.user_agent, "checkout-web/2.3");
    assert_eq!(config.retry.base_delay, Duration::from_millis(500));
    assert_eq!(
        config.retry.backoff,
        BackoffStrategy::Linear {
            increment: Duration::from_millis(250)
        }
    );
    assert!(config.reporting.log_records);
    assert!(config.circuit_breaker.enabled);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);

    let endpoints = config.builtin_endpoints().unwrap();
    assert_eq!(endpoints.health_check, "https://shop.example.com/status");
    assert_eq!(
        endpoints.connectivity_probe,
        "https://shop.example.com/api/health"
    );
    assert_eq!(endpoints.login_target, "/account/login");
}

#[test]
#[serial]
fn test_environment_only() {
    with_vars(
        [
            ("ERROR_HANDLER__MAX_HISTORY_SIZE", Some("7")),
            ("ERROR_HANDLER__RECENCY_WINDOW", Some("2h")),
            ("ERROR_HANDLER__RETRY__MAX_DELAY", Some("5s")),
        ],
        || {
            let config = ConfigLoader::new().load().unwrap();
            assert_eq!(config.max_history_size, 7);
            assert_eq!(config.recency_window, Duration::from_secs(2 * 60 * 60));
            assert_eq!(config.retry.max_delay, Duration::from_secs(5));
            assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        },
    );
}

#[test]
#[serial]
fn test_invalid_multiplier_rejected() {
    let file = config_file(
        r#"
[retry.backoff]
type = "exponential"
multiplier = 0.5
"#,
    );

    let result = ConfigLoader::new()
        .without_environment()
        .with_file(file.path())
        .load();

    assert!(matches!(result, Err(HandlerError::Config(_))));
}

#[test]
#[serial]
fn test_base_delay_above_cap_rejected() {
    let file = config_file(
        r#"
[retry]
base_delay = "1m"
max_delay = "30s"
"#,
    );

    let result = ConfigLoader::new()
        .without_environment()
        .with_file(file.path())
        .load();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_loaded_config_builds_handler() {
    let file = config_file(FULL_CONFIG);
    let config = ConfigLoader::new()
        .without_environment()
        .with_file(file.path())
        .load()
        .unwrap();

    let handler = ErrorHandler::builder().config(config).build().unwrap();

    assert_eq!(handler.config().max_history_size, 20);
    assert_eq!(
        handler.get_available_strategies(),
        vec![
            ErrorKind::Authentication,
            ErrorKind::Client,
            ErrorKind::Network,
            ErrorKind::Permission,
            ErrorKind::Server,
            ErrorKind::Validation,
        ]
    );

    let result = tokio_test::block_on(handler.handle("Validation failed: email is required"));
    assert_eq!(result.strategy, ErrorKind::Validation);
    assert_eq!(result.attempts, 0);
    assert_eq!(handler.get_error_history(None).len(), 1);
}

#[test]
fn test_default_config_matches_documented_constants() {
    let config = HandlerConfig::default();

    assert_eq!(config.max_history_size, 50);
    assert_eq!(config.recency_window, Duration::from_secs(3600));
    assert_eq!(config.retry.base_delay, Duration::from_secs(1));
    assert_eq!(config.retry.max_delay, Duration::from_secs(30));
    assert_eq!(
        config.retry.backoff,
        BackoffStrategy::Exponential { multiplier: 2.0 }
    );
    assert_eq!(config.retry.attempt_timeout, Duration::from_secs(10));
    assert!(!config.circuit_breaker.enabled);
}
