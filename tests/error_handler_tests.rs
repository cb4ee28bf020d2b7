//! End-to-end tests for error handling and recovery
//!
//! Runs errors through a fully wired handler backed by deterministic ports.

use error_recovery_engine::error_recovery::{
    FnReporter, FnStrategy, RecoveryOutcome, RecoveryStrategy, Reporter, OFFLINE_MESSAGE,
};
use error_recovery_engine::mock::{FailingReporter, RecordingReporter, ScriptedTransport};
use error_recovery_engine::ports::KeyValueStore;
use error_recovery_engine::{
    Context, ErrorKind, ErrorRecord, HandlerConfig, HandlerError, RawError,
};
use pretty_assertions::assert_eq;
use rstest::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod common;
use common::{healthy_env, small_history_env, TestEnv};

#[rstest]
#[tokio::test]
async fn test_plain_error_is_unknown_and_handled(healthy_env: TestEnv) {
    let result = healthy_env.handler.handle("Test error").await;

    assert_eq!(result.error_info.kind(), &ErrorKind::Unknown);
    assert_eq!(result.strategy, ErrorKind::Unknown);
    assert!(result.error_info.handled());
    assert!(!result.error_info.id().is_empty());
    assert!(!result.recovered);
    assert_eq!(result.attempts, 0);
    assert_eq!(result.error, None);
}

#[rstest]
#[tokio::test]
async fn test_record_ids_are_unique(healthy_env: TestEnv) {
    let mut ids = HashSet::new();
    for _ in 0..20 {
        let result = healthy_env.handler.handle("Test error").await;
        assert!(ids.insert(result.error_info.id().to_string()));
    }
}

#[rstest]
#[tokio::test]
async fn test_missing_error_is_handled(healthy_env: TestEnv) {
    let result = healthy_env.handler.handle(None::<RawError>).await;

    assert_eq!(result.strategy, ErrorKind::Unknown);
    assert_eq!(result.error_info.message(), "");
}

#[rstest]
#[tokio::test]
async fn test_record_captures_environment(healthy_env: TestEnv) {
    let mut context = Context::new();
    context.insert("component".to_string(), json!("cart"));
    context.insert("retry".to_string(), json!(false));

    let result = healthy_env
        .handler
        .handle_error("Test error", context.clone())
        .await;

    let record = &result.error_info;
    assert_eq!(record.context(), &context);
    assert_eq!(record.url(), "http://localhost/app");
    assert_eq!(record.user_agent(), HandlerConfig::default().user_agent);
    assert_eq!(record.timestamp_iso(), "2024-01-01T12:00:00.000Z");

    let serialized = serde_json::to_value(record).unwrap();
    assert_eq!(serialized["type"], "unknown");
    assert_eq!(serialized["userAgent"], HandlerConfig::default().user_agent);
}

#[rstest]
#[tokio::test]
async fn test_history_is_bounded_and_newest_first(small_history_env: TestEnv) {
    for i in 0..5 {
        small_history_env.handler.handle(format!("E{i}")).await;
    }

    let history = small_history_env.handler.get_error_history(None);
    let messages: Vec<&str> = history.iter().map(|r| r.message()).collect();
    assert_eq!(messages, vec!["E4", "E3", "E2"]);

    let limited = small_history_env.handler.get_error_history(Some(2));
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].message(), "E4");
    assert_eq!(limited[1].message(), "E3");
}

#[rstest]
#[tokio::test]
async fn test_clear_history(healthy_env: TestEnv) {
    healthy_env.handler.handle("Test error").await;
    healthy_env.handler.clear_error_history();

    assert!(healthy_env.handler.get_error_history(None).is_empty());
    assert_eq!(healthy_env.handler.get_error_statistics().total, 0);
}

#[rstest]
#[tokio::test]
async fn test_network_recovers_on_first_probe(healthy_env: TestEnv) {
    let result = healthy_env.handler.handle("Network error").await;

    assert!(result.recovered);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.strategy, ErrorKind::Network);
    assert_eq!(healthy_env.transport.request_count(), 1);
    assert!(healthy_env.handler.get_error_history(None)[0].recovered());
}

#[tokio::test]
async fn test_network_recovers_after_two_failed_probes() {
    let env = TestEnv::with_transport(ScriptedTransport::healthy().then([Some(503), None]));

    let result = env.handler.handle("Network error").await;

    assert!(result.recovered);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.strategy, ErrorKind::Network);
    assert_eq!(env.transport.request_count(), 3);
}

#[rstest]
#[tokio::test]
async fn test_offline_network_error_is_not_probed(healthy_env: TestEnv) {
    healthy_env.connectivity.set_online(false);

    let result = healthy_env.handler.handle("Network error").await;

    assert!(!result.recovered);
    assert_eq!(result.attempts, 0);
    assert!(result.error.as_deref().unwrap().contains(OFFLINE_MESSAGE));
    assert_eq!(healthy_env.transport.request_count(), 0);
}

#[tokio::test]
async fn test_network_failure_reports_last_reason() {
    let env = TestEnv::with_transport(ScriptedTransport::unreachable());

    let result = env.handler.handle("Failed to fetch").await;

    assert!(!result.recovered);
    assert_eq!(result.attempts, 3);
    assert_eq!(
        result.error.as_deref(),
        Some("Transport error: Failed to fetch http://localhost/api/health")
    );
    assert!(!env.handler.get_error_history(None)[0].recovered());
}

#[rstest]
#[case::by_status(RawError::from_status(403))]
#[case::by_message(RawError::new("Forbidden"))]
#[tokio::test]
async fn test_permission_is_never_retried(#[case] error: RawError) {
    let env = TestEnv::with_transport(ScriptedTransport::healthy());

    let result = env.handler.handle(error).await;

    assert_eq!(result.strategy, ErrorKind::Permission);
    assert!(!result.recovered);
    assert_eq!(result.attempts, 0);
    assert_eq!(result.error, None);
    assert_eq!(env.transport.request_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_zero_budget_strategy_is_not_invoked(healthy_env: TestEnv) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    healthy_env.handler.add_recovery_strategy(
        ErrorKind::Validation,
        Arc::new(FnStrategy::new(0, move |_e: RawError, _a: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { RecoveryOutcome::Recovered }
        })),
    );

    let result = healthy_env.handler.handle(RawError::from_status(422)).await;

    assert_eq!(result.strategy, ErrorKind::Validation);
    assert_eq!(result.attempts, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_status_overrides_message() {
    let env = TestEnv::with_transport(ScriptedTransport::with_fallback(Some(401)));

    let result = env
        .handler
        .handle(RawError::new("Network error").with_status(401))
        .await;

    assert_eq!(result.strategy, ErrorKind::Authentication);
    assert!(!result.recovered);
    assert_eq!(result.attempts, 1);
    assert_eq!(env.location.navigations(), vec!["/login".to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_server_error_checks_health(healthy_env: TestEnv) {
    let result = healthy_env.handler.handle(RawError::from_status(502)).await;

    assert_eq!(result.strategy, ErrorKind::Server);
    assert!(result.recovered);
    let requests = healthy_env.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://localhost/api/health");
}

#[rstest]
#[tokio::test]
async fn test_client_error_purges_bad_state(healthy_env: TestEnv) {
    healthy_env
        .store
        .set("layout", "{\"columns\":3".to_string())
        .unwrap();
    healthy_env
        .store
        .set("user", "{\"id\":7}".to_string())
        .unwrap();

    let result = healthy_env
        .handler
        .handle("Cannot read properties of undefined (reading 'map')")
        .await;

    assert_eq!(result.strategy, ErrorKind::Client);
    assert!(result.recovered);
    assert_eq!(healthy_env.store.get("layout"), None);
    assert!(healthy_env.store.get("user").is_some());
}

#[rstest]
#[tokio::test]
async fn test_failing_reporter_does_not_affect_others(healthy_env: TestEnv) {
    let failing = Arc::new(FailingReporter::new());
    let recording = Arc::new(RecordingReporter::new());
    healthy_env.handler.add_error_reporter(failing.clone());
    healthy_env.handler.add_error_reporter(recording.clone());

    let result = healthy_env.handler.handle("Network error").await;

    assert!(result.recovered);
    assert_eq!(failing.calls(), 1);
    assert_eq!(recording.count(), 1);
    assert_eq!(recording.records()[0].id(), result.error_info.id());
}

#[rstest]
#[tokio::test]
async fn test_statistics_example(healthy_env: TestEnv) {
    healthy_env.handler.handle("Network error").await;
    healthy_env.handler.handle("Failed to fetch").await;
    healthy_env.handler.handle(RawError::from_status(403)).await;

    let stats = healthy_env.handler.get_error_statistics();

    assert_eq!(stats.total, 3);
    assert_eq!(stats.count_for("network"), 2);
    assert_eq!(stats.count_for("permission"), 1);
    assert_eq!(stats.unrecovered, 1);
    assert_eq!(stats.recent_errors, 3);

    let serialized = serde_json::to_value(&stats).unwrap();
    assert_eq!(serialized["byType"]["network"], 2);
}

#[rstest]
#[tokio::test]
async fn test_error_rate_threshold(healthy_env: TestEnv) {
    for _ in 0..5 {
        healthy_env.handler.handle("Test error").await;
    }
    assert!(!healthy_env.handler.is_error_rate_too_high(5));

    healthy_env.handler.handle("Test error").await;
    assert!(healthy_env.handler.is_error_rate_too_high(5));
}

#[rstest]
#[tokio::test]
async fn test_old_errors_leave_recency_window(healthy_env: TestEnv) {
    for _ in 0..6 {
        healthy_env.handler.handle("Test error").await;
    }
    healthy_env.clock.advance(chrono::Duration::hours(1));

    let stats = healthy_env.handler.get_error_statistics();
    assert_eq!(stats.total, 6);
    assert_eq!(stats.recent_errors, 0);
    assert!(!healthy_env.handler.is_error_rate_too_high(5));
}

#[rstest]
#[tokio::test]
async fn test_strategy_add_remove_round_trip(healthy_env: TestEnv) {
    let before = healthy_env.handler.get_available_strategies();
    assert!(!before.contains(&ErrorKind::Unknown));

    let strategy: Arc<dyn RecoveryStrategy> = Arc::new(FnStrategy::new(
        1,
        |_e: RawError, _a: u32| async { RecoveryOutcome::Recovered },
    ));
    healthy_env
        .handler
        .add_recovery_strategy(ErrorKind::Unknown, strategy);

    let recovered = healthy_env.handler.handle("Test error").await;
    assert!(recovered.recovered);
    assert_eq!(recovered.attempts, 1);

    assert!(healthy_env
        .handler
        .remove_recovery_strategy(&ErrorKind::Unknown));
    assert_eq!(healthy_env.handler.get_available_strategies(), before);

    let restored = healthy_env.handler.handle("Test error").await;
    assert!(!restored.recovered);
    assert_eq!(restored.attempts, 0);
}

#[rstest]
#[tokio::test]
async fn test_reporter_add_remove_round_trip(healthy_env: TestEnv) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let reporter: Arc<dyn Reporter> = Arc::new(FnReporter::new("counter", move |_record: ErrorRecord| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<(), HandlerError>(()) }
    }));

    assert!(healthy_env.handler.add_error_reporter(reporter.clone()));
    healthy_env.handler.handle("Test error").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(healthy_env.handler.remove_error_reporter(&reporter));
    healthy_env.handler.handle("Test error").await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn test_custom_kind_escape_hatch(healthy_env: TestEnv) {
    let kind = ErrorKind::custom("quota");
    healthy_env.handler.add_recovery_strategy(
        kind.clone(),
        Arc::new(FnStrategy::new(1, |_e: RawError, _a: u32| async {
            RecoveryOutcome::Recovered
        })),
    );

    let available = healthy_env.handler.get_available_strategies();
    assert!(available.contains(&kind));
    assert!(available.contains(&ErrorKind::Network));
}

#[tokio::test]
async fn test_pre_cancelled_token_skips_attempts() {
    let env = TestEnv::with_transport(ScriptedTransport::healthy());
    let token = CancellationToken::new();
    token.cancel();

    let result = env
        .handler
        .handle_error_with_cancel("Network error", Context::new(), token)
        .await;

    assert!(!result.recovered);
    assert_eq!(result.attempts, 0);
    assert_eq!(result.error.as_deref(), Some("Recovery cancelled"));
    assert_eq!(env.transport.request_count(), 0);
    assert_eq!(env.handler.retry_stats().cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_backoff_doubles_between_attempts() {
    let env = TestEnv::new(
        HandlerConfig::default(),
        ScriptedTransport::healthy().then([None, None]),
    );

    let started = tokio::time::Instant::now();
    let result = env.handler.handle("Network error").await;

    assert!(result.recovered);
    assert_eq!(result.attempts, 3);
    // 1s after the first failure, 2s after the second
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(env.handler.retry_stats().total_retry_attempts, 2);
}
