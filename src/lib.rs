//! Telespool - machine telemetry store-and-forward agent
//!
//! Collects time-series samples from a machine-telemetry source, buffers
//! them per logical channel, and forwards them to remote destinations. Two
//! delivery paths exist: a message-hub path gated by a readiness/assignment
//! handshake, and an object-store path using append-only block commits.
//!
//! # Architecture
//!
//! - **Pipeline**: per-device worker owning the sample router, the flush
//!   coordinator, and one of the delivery sinks
//! - **Source**: typed event stream contract for telemetry producers, plus a
//!   built-in simulator
//! - **Transport**: message-hub and object-store contracts, plus in-memory
//!   implementations for simulation and tests
//! - **Config**: YAML configuration with validation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telespool::pipeline::{Pipeline, PipelineSettings, SessionToken};
//! use telespool::source::{SimSource, SimSourceConfig};
//! use telespool::transport::MemoryHub;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(SimSource::new(SimSourceConfig::default()));
//! let hub = Arc::new(MemoryHub::with_auto_assign("data"));
//!
//! let session = SessionToken::start("sim-mill-1");
//! let pipeline = Pipeline::new(
//!     source,
//!     session,
//!     PipelineSettings::default(),
//!     CancellationToken::new(),
//! );
//! pipeline.run_with_hub(hub).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errorlog;
pub mod pipeline;
pub mod source;
pub mod transport;

pub use config::{AppConfig, ConfigError, SinkMode};
pub use pipeline::{
    AppendBlobWriter, ChannelKey, DestinationMap, FlushCoordinator, Pipeline, PipelineError,
    PipelineSettings, SampleRouter, SessionToken, TelemetryUplink,
};
pub use source::{Sample, SimSource, SimSourceConfig, SourceEvent, TelemetrySource};
pub use transport::{HubTransport, MemoryHub, MemoryStore, ObjectStore};
