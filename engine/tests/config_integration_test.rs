//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded
//! from disk and validated.

use deskpilot_engine::config::Config;
use deskpilot_engine::telemetry::LogFormat;
use sdk::errors::EngineError;
use std::fs;
use tempfile::TempDir;

const MINIMAL_TOML: &str = r#"
[core]
log_level = "debug"
log_format = "json"

[llm]
default_model = "claude-test"
"#;

#[test]
fn test_load_full_config_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    let contents = r#"
[core]
log_level = "warn"
log_format = "compact"

[llm]
default_model = "claude-test"
max_output_tokens = 4096
request_timeout_secs = 60

[llm.anthropic]
base_url = "http://localhost:9999/v1"
api_key_env = "DESKPILOT_KEY"

[agent]
max_retries = 5
retry_base_delay_ms = 100
retry_max_delay_ms = 1000
max_turns = 40
needs_help_marker = "HELP:"

[desktop]
screenshot_max_bytes = 500000
display = ":99"
command_timeout_secs = 10
"#;
    fs::write(&path, contents).unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "warn");
    assert_eq!(config.core.log_format, LogFormat::Compact);
    assert_eq!(config.llm.max_output_tokens, 4096);
    assert_eq!(config.llm.anthropic.base_url, "http://localhost:9999/v1");
    assert_eq!(config.llm.anthropic.api_key_env, "DESKPILOT_KEY");
    assert_eq!(config.agent.max_retries, 5);
    assert_eq!(config.agent.max_turns, 40);
    assert_eq!(config.agent.needs_help_marker, "HELP:");
    assert_eq!(config.desktop.display, ":99");
    assert_eq!(config.desktop.screenshot_max_bytes, 500_000);
}

#[test]
fn test_missing_sections_use_defaults() {
    let config = Config::from_toml_str(MINIMAL_TOML).unwrap();

    assert_eq!(config.core.log_format, LogFormat::Json);
    assert_eq!(config.llm.max_output_tokens, 8192);
    assert_eq!(config.llm.request_timeout_secs, 300);
    assert_eq!(config.llm.anthropic.api_key_env, "ANTHROPIC_API_KEY");
    assert_eq!(config.agent.max_retries, 3);
    assert_eq!(config.agent.retry_base_delay_ms, 500);
    assert_eq!(config.agent.retry_max_delay_ms, 8000);
    assert_eq!(config.agent.max_turns, 100);
    assert_eq!(config.desktop.screenshot_max_bytes, 1_048_576);
    assert_eq!(config.desktop.display, ":0");
}

#[test]
fn test_invalid_values_rejected() {
    let base = MINIMAL_TOML.to_string();

    let cases = [
        (base.replace("\"debug\"", "\"loud\""), "Invalid log level"),
        (
            format!("{}\n[agent]\nmax_turns = 0\n", base),
            "max_turns",
        ),
        (
            format!(
                "{}\n[agent]\nretry_base_delay_ms = 9000\nretry_max_delay_ms = 10\n",
                base
            ),
            "retry_base_delay_ms",
        ),
        (
            format!("{}\n[desktop]\nscreenshot_max_bytes = 0\n", base),
            "screenshot_max_bytes",
        ),
    ];

    for (contents, expected) in cases {
        match Config::from_toml_str(&contents) {
            Err(EngineError::Config(msg)) => {
                assert!(msg.contains(expected), "{} does not mention {}", msg, expected)
            }
            other => panic!("expected config error for {}, got {:?}", expected, other),
        }
    }
}

#[test]
fn test_malformed_toml_is_config_error() {
    let err = Config::from_toml_str("[core\nlog_level = ").unwrap_err();
    assert!(matches!(err, EngineError::Config(msg) if msg.contains("Failed to parse")));
}

#[test]
fn test_missing_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&temp_dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_default_config_round_trips_through_toml() {
    let config = Config::default_config();

    let text = toml::to_string_pretty(&config).unwrap();
    let parsed = Config::from_toml_str(&text).unwrap();

    assert_eq!(parsed.llm.default_model, config.llm.default_model);
    assert_eq!(parsed.agent.needs_help_marker, config.agent.needs_help_marker);
    assert_eq!(parsed.core.log_format, config.core.log_format);
}
