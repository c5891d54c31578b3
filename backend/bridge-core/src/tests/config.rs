// Unit tests for bridge configuration loading and validation.

use crate::config::{BridgeConfig, OverflowPolicy};
use crate::error::ConfigError;

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

/// **VALUE**: Verifies a missing file yields defaults instead of an error.
///
/// **WHY THIS MATTERS**: First launch has no config; the bridge must still start.
#[test]
fn given_missing_file_when_loaded_then_defaults() {
    // GIVEN: An empty config directory
    let dir = TempDir::new().unwrap();

    // WHEN: Loading
    let config = BridgeConfig::load(dir.path()).unwrap();

    // THEN: Documented defaults
    assert_eq!(config.request.timeout(), Duration::from_millis(5_000));
    assert_eq!(config.request.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 250);
    assert_eq!(config.retry.max_delay_ms, 8_000);
    assert_eq!(config.batch.max_size, 10);
    assert_eq!(config.queue.capacity, 100);
    assert_eq!(config.queue.overflow, OverflowPolicy::EvictOldest);
    assert_eq!(config.health.interval(), Some(Duration::from_secs(10)));
    assert_eq!(config.metrics.latency_window, 1_024);
}

/// **VALUE**: Verifies a partial file only overrides what it names.
///
/// **BUG THIS CATCHES**: Missing `#[serde(default)]` on a section or field.
#[test]
fn given_partial_file_when_loaded_then_merged_with_defaults() {
    // GIVEN: A file overriding a few values
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("bridge.toml"),
        r#"
[request]
timeout_ms = 1500

[batch]
methods = ["getFields", "getBlocks"]

[queue]
overflow = "reject_newest"

[transport]
url = "ws://127.0.0.1:9000/bridge"
"#,
    )
    .unwrap();

    // WHEN: Loading
    let config = BridgeConfig::load(dir.path()).unwrap();

    // THEN: Overrides applied, the rest default
    assert_eq!(config.request.timeout_ms, 1_500);
    assert_eq!(config.request.max_attempts, 3);
    assert!(config.is_batchable("getBlocks"));
    assert!(!config.is_batchable("saveTemplate"));
    assert_eq!(config.queue.overflow, OverflowPolicy::RejectNewest);
    let url = config.transport.parsed_url().unwrap().unwrap();
    assert_eq!(url.port(), Some(9000));
}

/// **VALUE**: Verifies corrupt TOML surfaces as a parse error naming the file.
#[test]
fn given_corrupt_file_when_loaded_then_parse_error() {
    // GIVEN: Invalid TOML
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bridge.toml"), "[request\ntimeout_ms = ").unwrap();

    // WHEN: Loading
    let err = BridgeConfig::load(dir.path()).unwrap_err();

    // THEN: ParseError
    assert!(matches!(err, ConfigError::ParseError { .. }), "got {err:?}");
}

type Mutation = fn(&mut BridgeConfig);

fn case(name: &'static str, mutate: Mutation) -> (&'static str, Mutation) {
    (name, mutate)
}

/// **VALUE**: Verifies range checks reject configs that would misbehave at runtime.
///
/// **WHY THIS MATTERS**: A zero capacity queue or a shrinking multiplier only fails later,
/// under load, far away from the bad value.
#[test]
fn given_out_of_range_values_when_validated_then_each_rejected() {
    let cases = [
        case("zero timeout", |c| c.request.timeout_ms = 0),
        case("unbounded timeout", |c| c.request.timeout_ms = u64::MAX),
        case("zero attempts", |c| c.request.max_attempts = 0),
        case("multiplier below one", |c| c.retry.multiplier = 0.5),
        case("jitter of one", |c| c.retry.jitter = 1.0),
        case("max below base", |c| c.retry.max_delay_ms = 10),
        case("unbounded max delay", |c| c.retry.max_delay_ms = u64::MAX),
        case("empty batch", |c| c.batch.max_size = 0),
        case("empty queue", |c| c.queue.capacity = 0),
        case("zero connect timeout", |c| c.transport.connect_timeout_ms = 0),
        case("zero latency window", |c| c.metrics.latency_window = 0),
        case("http url", |c| c.transport.url = Some("http://localhost".to_string())),
    ];

    for (name, mutate) in cases {
        // GIVEN: Defaults with one bad value
        let mut config = BridgeConfig::default();
        mutate(&mut config);

        // WHEN: Validating
        let result = config.validate();

        // THEN: Rejected
        assert!(
            matches!(result, Err(ConfigError::ValidationError { .. })),
            "{name} should fail validation"
        );
    }
}

/// **VALUE**: Verifies probing can be disabled with a zero interval.
#[test]
fn given_zero_health_interval_when_validated_then_ok_and_disabled() {
    let mut config = BridgeConfig::default();
    config.health.interval_ms = 0;
    config.health.misses_before_degraded = 0;

    assert!(config.validate().is_ok());
    assert_eq!(config.health.interval(), None);
}
