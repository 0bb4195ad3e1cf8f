//! Layered configuration loading

use pretty_assertions::assert_eq;
use resilience_engine::ResilienceConfig;
use rstest::rstest;
use serial_test::serial;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

const TOML: &str = r#"
[circuit_breaker]
failure_threshold = 4
open_timeout = "30s"

[backoff]
base_delay = "250ms"

[offline_queue]
max_size = 10

[logging]
level = "debug"
json = true
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_defaults_without_file() {
    let config = ResilienceConfig::load(None).unwrap();
    assert_eq!(config, ResilienceConfig::default());
    assert_eq!(config.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.circuit_breaker.open_timeout, Duration::from_secs(60));
    assert_eq!(config.cache.default_ttl, Duration::from_millis(300_000));
    assert_eq!(config.offline_queue.max_age, Duration::from_secs(86_400));
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let file = write_config(TOML);
    let config = ResilienceConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.circuit_breaker.failure_threshold, 4);
    assert_eq!(config.circuit_breaker.success_threshold, 2);
    assert_eq!(config.circuit_breaker.open_timeout, Duration::from_secs(30));
    assert_eq!(config.backoff.base_delay, Duration::from_millis(250));
    assert_eq!(config.backoff.max_retries, 3);
    assert_eq!(config.offline_queue.max_size, 10);
    assert!(config.logging.json);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config(TOML);
    std::env::set_var("RECOVERY__CIRCUIT_BREAKER__FAILURE_THRESHOLD", "7");
    let loaded = ResilienceConfig::load(Some(file.path()));
    std::env::remove_var("RECOVERY__CIRCUIT_BREAKER__FAILURE_THRESHOLD");

    let config = loaded.unwrap();
    assert_eq!(config.circuit_breaker.failure_threshold, 7);
    assert_eq!(config.offline_queue.max_size, 10);
}

#[test]
#[serial]
fn test_missing_file_is_an_error() {
    let error = ResilienceConfig::load(Some(Path::new("/nonexistent/recovery.toml"))).unwrap_err();
    assert!(error.to_string().contains("not found"));
}

#[test]
fn test_invalid_values_rejected() {
    let error = ResilienceConfig::from_toml_str("[circuit_breaker]\nfailure_threshold = 0\n")
        .unwrap_err();
    assert!(error.to_string().contains("failure_threshold"));

    assert!(ResilienceConfig::from_toml_str("[cache]\ndefault_ttl = \"soon\"\n").is_err());
}

#[rstest]
#[case("[selector]\nnetwork_retry_limit = 0\n", "network_retry_limit")]
#[case("[selector]\ndefault_retry_limit = 0\n", "default_retry_limit")]
#[case("[offline_queue]\nmax_attempts = 0\n", "max_attempts")]
fn test_zero_limits_rejected(#[case] toml: &str, #[case] field: &str) {
    let error = ResilienceConfig::from_toml_str(toml).unwrap_err();
    assert!(error.to_string().contains(field), "{error}");
}

#[test]
fn test_presets_are_valid() {
    assert!(ResilienceConfig::critical_service().validate().is_ok());
    assert!(ResilienceConfig::background_service().validate().is_ok());
    assert_eq!(
        ResilienceConfig::critical_service()
            .circuit_breaker
            .failure_threshold,
        3
    );
}
