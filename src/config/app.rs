//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::pipeline::{PipelineSettings, RetryPolicy};

use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default sampling period handed to the source.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Default samples per streaming request.
pub const DEFAULT_RECORD_COUNT: u32 = 100;

/// Default deadline for the destination assignment.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

fn default_sample_interval() -> Duration {
    DEFAULT_SAMPLE_INTERVAL
}

fn default_record_count() -> u32 {
    DEFAULT_RECORD_COUNT
}

fn default_handshake_timeout() -> Duration {
    DEFAULT_HANDSHAKE_TIMEOUT
}

fn default_base_url() -> String {
    "http://localhost:5000/".to_string()
}

fn default_container() -> String {
    "data".to_string()
}

fn default_error_log_path() -> PathBuf {
    PathBuf::from("errors")
}

// =============================================================================
// Sections
// =============================================================================

/// Telemetry source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the telemetry source (informational for the simulator).
    pub base_url: String,

    /// Sampling period (default: 1s).
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,

    /// Target samples per streaming request (default: 100).
    pub record_count: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sample_interval: default_sample_interval(),
            record_count: default_record_count(),
        }
    }
}

/// Which delivery path buffered batches take.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SinkMode {
    /// Message-hub path: handshake, then `machineData` messages.
    #[default]
    Hub,
    /// Object-store path: hub bypassed, block appends to local destinations.
    Store,
}

/// Message-hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Deadline for the destination assignment (default: 60s).
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

/// Object-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Container the per-channel objects live in (default: "data").
    pub container: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            container: default_container(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Devices to collect from.
    #[serde(default)]
    pub devices: Vec<String>,

    /// Telemetry source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Active delivery path (default: hub).
    #[serde(default)]
    pub sink: SinkMode,

    /// Message-hub settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// Object-store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Retry policy for both delivery paths.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Directory for timestamped error artifacts.
    #[serde(default = "default_error_log_path")]
    pub error_log_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            source: SourceConfig::default(),
            sink: SinkMode::default(),
            hub: HubConfig::default(),
            store: StoreConfig::default(),
            retry: RetryPolicy::default(),
            error_log_path: default_error_log_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Validation(
                "at least one device must be configured".to_string(),
            ));
        }
        if self.source.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "source.base_url must not be empty".to_string(),
            ));
        }
        if self.source.sample_interval.is_zero() {
            return Err(ConfigError::Validation(
                "source.sample_interval must be positive".to_string(),
            ));
        }
        if self.source.record_count == 0 {
            return Err(ConfigError::Validation(
                "source.record_count must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sink == SinkMode::Store && self.store.container.is_empty() {
            return Err(ConfigError::Validation(
                "store.container must not be empty in store mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-pipeline tunables derived from this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            sample_count: self.source.record_count,
            update_interval: self.source.sample_interval,
            handshake_timeout: self.hub.handshake_timeout,
            retry: self.retry.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_with_defaults() {
        let config: AppConfig = serde_yaml::from_str("devices: [mill-1]").unwrap();
        config.validate().unwrap();

        assert_eq!(config.devices, vec!["mill-1"]);
        assert_eq!(config.sink, SinkMode::Hub);
        assert_eq!(config.source.sample_interval, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(config.source.record_count, DEFAULT_RECORD_COUNT);
        assert_eq!(config.hub.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(config.error_log_path, PathBuf::from("errors"));
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
devices: [mill-1, lathe-2]
source:
  base_url: "http://agent:5000/"
  sample_interval: 500ms
  record_count: 50
sink: store
store:
  container: shopfloor
retry:
  max_attempts: 3
  initial_backoff: 250ms
  max_backoff: 10s
error_log_path: /var/log/telespool
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.sink, SinkMode::Store);
        assert_eq!(config.store.container, "shopfloor");
        assert_eq!(config.source.sample_interval, Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_empty_devices_rejected() {
        let config: AppConfig = serde_yaml::from_str("devices: []").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_record_count_rejected() {
        let yaml = "devices: [m]\nsource:\n  record_count: 0\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_mode_requires_container() {
        let yaml = "devices: [m]\nsink: store\nstore:\n  container: \"\"\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_settings_mirror_config() {
        let yaml = "devices: [m]\nsource:\n  sample_interval: 2s\n  record_count: 7\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let settings = config.pipeline_settings();
        assert_eq!(settings.update_interval, Duration::from_secs(2));
        assert_eq!(settings.sample_count, 7);
    }
}
