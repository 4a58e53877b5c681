//! Bridge configuration

use crate::AlertError;
use config::{Config, ConfigError, Environment, File, FileFormat};
use notify::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "alert-bridge.toml";

/// Prefix for environment overrides, e.g. `ALERT_BRIDGE__RETRY__MAX_ATTEMPTS=5`
const ENV_PREFIX: &str = "ALERT_BRIDGE";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub summary: SummaryConfig,
    pub log: LogConfig,
    pub channels: Vec<ChannelConfig>,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Alert and silence persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Only used by the SQLite backend
    pub sqlite_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_url: "sqlite://alert-bridge.db".to_string(),
        }
    }
}

/// Channel retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    /// Fraction in `[0, 1)`
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 100,
            max_interval_ms: 5000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Validate and convert into the policy the notifier runs with
    pub fn to_policy(&self) -> Result<RetryPolicy, AlertError> {
        if self.max_attempts == 0 {
            return Err(AlertError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.multiplier >= 1.0) {
            return Err(AlertError::Validation(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(AlertError::Validation(
                "retry.jitter_factor must be in [0, 1)".to_string(),
            ));
        }
        if self.initial_interval_ms > self.max_interval_ms {
            return Err(AlertError::Validation(format!(
                "retry.initial_interval_ms ({}) exceeds retry.max_interval_ms ({})",
                self.initial_interval_ms, self.max_interval_ms
            )));
        }

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Length of the top acknowledgers list
    pub top_n: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self { top_n: 5 }
    }
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Writes notifications to the log
    #[default]
    Log,
}

/// One notification target, fanned out to in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
}

impl BridgeConfig {
    /// Load from an optional TOML file, then apply `ALERT_BRIDGE__*`
    /// environment overrides.
    ///
    /// A missing default file is fine; a missing explicit `path` is an error.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize::<Self>().map(Self::with_default_channel)
    }

    /// Parse a TOML document
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()
            .map(Self::with_default_channel)
    }

    fn with_default_channel(mut self) -> Self {
        if self.channels.is_empty() {
            self.channels.push(ChannelConfig {
                name: "log".to_string(),
                kind: ChannelKind::Log,
            });
        }
        self
    }
}
