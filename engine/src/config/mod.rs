//! Configuration management
//!
//! This module handles loading, validation, and management of the Deskpilot
//! configuration. Configuration is stored in TOML format at
//! ~/.deskpilot/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level and format
//! - **llm**: Model defaults, output ceiling, provider settings
//! - **agent**: Retry budget and backoff, turn cap, needs-help marker
//! - **desktop**: Screenshot size ceiling and driver settings
//!
//! # Examples
//!
//! ```no_run
//! use deskpilot_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Default model: {}", config.llm.default_model);
//! println!("Retry budget: {}", config.agent.max_retries);
//! # Ok(())
//! # }
//! ```

use crate::telemetry::LogFormat;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Model provider configuration
    pub llm: LLMConfig,

    /// Control loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Desktop driver settings
    #[serde(default)]
    pub desktop: DesktopConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (pretty, compact, json)
    #[serde(default)]
    pub log_format: LogFormat,

}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Model used when a task does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum output tokens per provider call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Upper bound on a single provider call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_anthropic_api_key_env")]
    pub api_key_env: String,

    /// Value of the `anthropic-version` header
    #[serde(default = "default_anthropic_version")]
    pub version: String,
}

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Retries after the first failed provider call before the task fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles on each retry
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Provider round-trips allowed per attempt
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Prefix of a final assistant reply asking for operator help
    #[serde(default = "default_needs_help_marker")]
    pub needs_help_marker: String,
}

/// Desktop driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    /// Ceiling for encoded screenshot payloads, in bytes
    #[serde(default = "default_screenshot_max_bytes")]
    pub screenshot_max_bytes: usize,

    /// X display used by the xdotool driver
    #[serde(default = "default_display")]
    pub display: String,

    /// Timeout for a single driver command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            api_key_env: default_anthropic_api_key_env(),
            version: default_anthropic_version(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            max_turns: default_max_turns(),
            needs_help_marker: default_needs_help_marker(),
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            screenshot_max_bytes: default_screenshot_max_bytes(),
            display: default_display(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl AgentConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_request_timeout() -> u64 {
    300
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_retry_max_delay() -> u64 {
    8_000
}

fn default_max_turns() -> usize {
    100
}

fn default_needs_help_marker() -> String {
    "[needs_help]".to_string()
}

fn default_screenshot_max_bytes() -> usize {
    1024 * 1024
}

fn default_display() -> String {
    ":0".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default location (~/.deskpilot/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, TOML parsing
    /// fails, or validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.deskpilot/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".deskpilot").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                log_format: LogFormat::default(),
            },
            llm: LLMConfig {
                default_model: default_model(),
                max_output_tokens: default_max_output_tokens(),
                request_timeout_secs: default_request_timeout(),
                anthropic: AnthropicConfig::default(),
            },
            agent: AgentConfig::default(),
            desktop: DesktopConfig::default(),
        }
    }

    /// Check value ranges
    fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.llm.default_model.trim().is_empty() {
            return Err(EngineError::Config(
                "default_model must not be empty".to_string(),
            ));
        }
        if self.llm.max_output_tokens == 0 {
            return Err(EngineError::Config(
                "max_output_tokens must be greater than 0".to_string(),
            ));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.agent.retry_base_delay_ms > self.agent.retry_max_delay_ms {
            return Err(EngineError::Config(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".to_string(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(EngineError::Config(
                "max_turns must be greater than 0".to_string(),
            ));
        }
        if self.agent.needs_help_marker.trim().is_empty() {
            return Err(EngineError::Config(
                "needs_help_marker must not be empty".to_string(),
            ));
        }

        if self.desktop.screenshot_max_bytes == 0 {
            return Err(EngineError::Config(
                "screenshot_max_bytes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
