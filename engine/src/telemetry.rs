//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels and formats, with `RUST_LOG` taking
//! precedence over the configured level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
    /// JSON objects including the current span (task id, attempt)
    Json,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Build the filter directive for a configured level.
fn filter_directive(log_level: &str) -> String {
    format!("{},deskpilot_engine={}", log_level, log_level)
}

/// Initialize the tracing subscriber with the given level and format.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn init_telemetry_with(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init()
            .ok(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok(),
    };
}

/// Initialize the tracing subscriber with default settings.
///
/// Use `init_telemetry_with` once config is available.
pub fn init_telemetry() {
    init_telemetry_with("info", LogFormat::default());
}
