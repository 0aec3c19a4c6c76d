//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/convtrace/config.toml`, with
//! environment variables overriding the sink section so the exporter can be
//! switched on per-shell without editing any file.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/convtrace/` (~/.config/convtrace/)
//! - State/Logs/Cursors: `$XDG_STATE_HOME/convtrace/` (~/.local/state/convtrace/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment flag that enables the exporter.
pub const ENABLED_ENV: &str = "CONVTRACE_ENABLED";
/// Environment flag that disables secret redaction.
pub const REDACT_ENV: &str = "CONVTRACE_REDACT";
/// Langfuse credential environment variables.
pub const PUBLIC_KEY_ENV: &str = "LANGFUSE_PUBLIC_KEY";
pub const SECRET_KEY_ENV: &str = "LANGFUSE_SECRET_KEY";
pub const HOST_ENV: &str = "LANGFUSE_HOST";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Langfuse sink configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Export pipeline configuration
#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    /// Override the transcript root (defaults to ~/.claude)
    pub transcript_root: Option<PathBuf>,

    /// Redact obvious secrets before anything leaves the machine
    #[serde(default = "default_redact")]
    pub redact: bool,

    /// Soft wall-clock budget for one run; exceeding it logs a warning
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            transcript_root: None,
            redact: default_redact(),
            budget_secs: default_budget_secs(),
        }
    }
}

fn default_redact() -> bool {
    true
}

fn default_budget_secs() -> u64 {
    180
}

impl ExportConfig {
    /// Transcript root directory, honoring the config override.
    pub fn transcript_root(&self) -> PathBuf {
        self.transcript_root
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }
}

/// Langfuse sink configuration
///
/// When enabled, convtrace pushes one trace per conversation turn to a
/// Langfuse server via its batch ingestion API.
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    /// Enable/disable trace export
    #[serde(default)]
    pub enabled: bool,

    /// Langfuse server URL
    #[serde(default = "default_host")]
    pub host: String,

    /// Public API key (pk-lf-...)
    pub public_key: Option<String>,

    /// Secret API key (sk-lf-...)
    pub secret_key: Option<String>,

    /// Events per ingestion call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            public_key: None,
            secret_key: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_host() -> String {
    "http://localhost:3050".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

impl SinkConfig {
    /// Check if the sink is enabled and fully configured
    pub fn is_ready(&self) -> bool {
        self.enabled && self.public_key.is_some() && self.secret_key.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.public_key.is_none() {
            return Err(Error::Config(
                "sink.public_key is required when the sink is enabled".to_string(),
            ));
        }
        if self.secret_key.is_none() {
            return Err(Error::Config(
                "sink.secret_key is required when the sink is enabled".to_string(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > 100 {
            return Err(Error::Config(
                "sink.batch_size must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path and apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path (no env overrides)
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply environment overrides: the activation flag, credentials, and
    /// the redaction switch.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(ENABLED_ENV) {
            self.sink.enabled = v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var(PUBLIC_KEY_ENV) {
            self.sink.public_key = Some(v);
        }
        if let Ok(v) = std::env::var(SECRET_KEY_ENV) {
            self.sink.secret_key = Some(v);
        }
        if let Ok(v) = std::env::var(HOST_ENV) {
            self.sink.host = v;
        }
        if let Ok(v) = std::env::var(REDACT_ENV) {
            self.export.redact = !v.eq_ignore_ascii_case("false");
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/convtrace/config.toml` (~/.config/convtrace/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("convtrace").join("config.toml")
    }

    /// Returns the state directory path (for logs and cursors)
    ///
    /// `$XDG_STATE_HOME/convtrace/` (~/.local/state/convtrace/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("convtrace")
    }

    /// Returns the cursor store path
    ///
    /// `$XDG_STATE_HOME/convtrace/cursors.json`
    pub fn cursor_path() -> PathBuf {
        Self::state_dir().join("cursors.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/convtrace/convtrace.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("convtrace.log")
    }
}
