//! Configuration module for the agent.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Device list and telemetry source settings
//! - Delivery path selection (hub or object store)
//! - Retry policy and handshake deadline
//! - Error artifact directory

mod app;
mod validation;

pub use app::{AppConfig, HubConfig, SinkMode, SourceConfig, StoreConfig};
pub use validation::ConfigError;
