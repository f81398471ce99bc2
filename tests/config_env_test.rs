//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env file
//! via dotenvy when present, so every test sets the variables it relies on.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use std::env;
use std::path::PathBuf;

use forecast_advisor::config::{Config, LogFormat};
use forecast_advisor::AppError;
use serial_test::serial;

const MANAGED_VARS: &[&str] = &[
    "ADVISOR_BASE_URL",
    "ADVISOR_PIPE",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
    "RETRY_DELAY_MS",
    "SESSION_MAX_ITERATIONS",
    "SESSION_WALL_CLOCK_SECS",
    "ROUTING_PRIORITY_THRESHOLD",
    "KNOWLEDGE_PATH",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

/// Set the API key and clear every optional override.
fn reset_env() {
    env::set_var("ADVISOR_API_KEY", "test-key");
    for var in MANAGED_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    reset_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.advisor.api_key, "test-key");
    assert_eq!(config.advisor.base_url, "https://api.langbase.com");
    assert_eq!(config.advisor.pipe, "forecast-advisor-v1");
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.request.max_retries, 3);
    assert_eq!(config.request.retry_delay_ms, 1000);
    assert_eq!(config.session.max_iterations, 10);
    assert_eq!(config.session.wall_clock_secs, 300);
    assert_eq!(config.session.routing_priority_threshold, 0.7);
    assert_eq!(config.knowledge.path, PathBuf::from("./data/knowledge.json"));
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
#[serial]
fn test_config_from_env_custom_advisor() {
    reset_env();
    env::set_var("ADVISOR_BASE_URL", "https://custom.api.com");
    env::set_var("ADVISOR_PIPE", "my-advisor");

    let config = Config::from_env().unwrap();
    assert_eq!(config.advisor.base_url, "https://custom.api.com");
    assert_eq!(config.advisor.pipe, "my-advisor");

    reset_env();
}

#[test]
#[serial]
fn test_config_from_env_custom_request() {
    reset_env();
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    reset_env();
}

#[test]
#[serial]
fn test_config_from_env_custom_session() {
    reset_env();
    env::set_var("SESSION_MAX_ITERATIONS", "4");
    env::set_var("SESSION_WALL_CLOCK_SECS", "45");
    env::set_var("ROUTING_PRIORITY_THRESHOLD", "0.55");
    env::set_var("KNOWLEDGE_PATH", "/tmp/bundle.json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.session.max_iterations, 4);
    assert_eq!(config.session.wall_clock_secs, 45);
    assert_eq!(config.session.routing_priority_threshold, 0.55);
    assert_eq!(config.knowledge.path, PathBuf::from("/tmp/bundle.json"));

    reset_env();
}

#[test]
#[serial]
fn test_config_threshold_is_clamped() {
    reset_env();
    env::set_var("ROUTING_PRIORITY_THRESHOLD", "1.8");

    let config = Config::from_env().unwrap();
    assert_eq!(config.session.routing_priority_threshold, 1.0);

    reset_env();
}

#[test]
#[serial]
fn test_config_invalid_number_uses_default() {
    reset_env();
    env::set_var("REQUEST_TIMEOUT_MS", "not_a_number");
    env::set_var("SESSION_MAX_ITERATIONS", "many");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.session.max_iterations, 10);

    reset_env();
}

#[test]
#[serial]
fn test_config_zero_iterations_rejected() {
    reset_env();
    env::set_var("SESSION_MAX_ITERATIONS", "0");

    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, AppError::Config { .. }));
    assert!(err.to_string().contains("SESSION_MAX_ITERATIONS"));

    reset_env();
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    reset_env();
    env::set_var("LOG_FORMAT", "JSON");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, "debug");

    reset_env();
}
