//! Herald configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (HERALD_*), used as defaults
//! - TOML configuration file

use herald_protocol::WireFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::metrics::{MetricsSink, NoopSink, RecorderSink};
use crate::retry::RetryPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Values are out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Fan-out engine settings.
    #[serde(default)]
    pub pubsub: PubSubConfig,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Backends to connect on startup.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Fan-out engine settings, shared by every backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    /// Maximum in-flight items per batch; unbounded when unset.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: Option<usize>,

    /// Envelope encoding.
    #[serde(default)]
    pub wire_format: WireFormat,

    /// Construction health check.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

/// Construction health check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Total flush attempts.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay after the first failure, in milliseconds.
    #[serde(default = "default_base_interval")]
    pub base_interval_ms: u64,

    /// Upper bound on any delay, in milliseconds.
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,

    /// Growth factor between delays.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

/// Metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Report counters to the `metrics` facade.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prefix for counter names.
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

/// A backend to connect on startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registry name.
    pub name: String,

    /// Address handed to the connector.
    pub address: String,
}

// Default value functions
fn default_max_concurrency() -> Option<usize> {
    std::env::var("HERALD_MAX_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
}

fn default_attempts() -> u32 {
    3
}

fn default_base_interval() -> u64 {
    10_000 // 10 seconds
}

fn default_max_interval() -> u64 {
    60_000 // 60 seconds
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_metrics_prefix() -> String {
    std::env::var("HERALD_METRICS_PREFIX").unwrap_or_else(|_| "herald".to_string())
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            wire_format: WireFormat::default(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_interval_ms: default_base_interval(),
            max_interval_ms: default_max_interval(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_metrics_prefix(),
        }
    }
}

impl HealthCheckConfig {
    /// Retry policy for the construction health check.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts,
            base_delay: Duration::from_millis(self.base_interval_ms),
            max_delay: Duration::from_millis(self.max_interval_ms),
            factor: self.backoff_factor,
        }
    }
}

impl MetricsConfig {
    /// Build the sink these settings describe.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        if self.enabled {
            let sink = RecorderSink::new(self.prefix.clone());
            sink.describe();
            Arc::new(sink)
        } else {
            Arc::new(NoopSink)
        }
    }
}

impl HeraldConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_paths = [
            "herald.toml",
            "/etc/herald/herald.toml",
            "~/.config/herald/herald.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: HeraldConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pubsub.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "pubsub.max_concurrency must be at least 1".into(),
            ));
        }

        let hc = &self.pubsub.health_check;
        if hc.attempts == 0 {
            return Err(ConfigError::Invalid(
                "pubsub.health_check.attempts must be at least 1".into(),
            ));
        }
        if !hc.backoff_factor.is_finite() || hc.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "pubsub.health_check.backoff_factor must be at least 1.0".into(),
            ));
        }
        if hc.max_interval_ms < hc.base_interval_ms {
            return Err(ConfigError::Invalid(
                "pubsub.health_check.max_interval_ms is below base_interval_ms".into(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                return Err(ConfigError::Invalid("backend name is empty".into()));
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "backend {:?} is listed twice",
                    backend.name
                )));
            }
        }

        Ok(())
    }
}
