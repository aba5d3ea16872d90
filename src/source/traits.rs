//! Core telemetry source traits and types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default capacity of the source event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Errors that can occur while talking to a telemetry source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source cannot reach the requested device.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Probe/discovery request failed.
    #[error("probe failed: {0}")]
    Probe(String),

    /// Streaming was requested before a probe completed.
    #[error("streaming requested before probe completed")]
    NotProbed,

    /// Underlying I/O error.
    #[error("source i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One sample emitted by the telemetry source.
///
/// Samples are consumed immediately into a channel buffer; the core never
/// holds them long-term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Data item name as reported by the device (e.g. "spindlespeed").
    pub name: String,
    /// Data item subtype (e.g. "ACTUAL"); empty when the device reports none.
    pub subtype: String,
    /// Textual value.
    pub value: String,
    /// Observation timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
}

/// Events delivered by a probed source.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// The probe finished; the device is ready to stream.
    ProbeCompleted,
    /// One sample changed.
    SampleChanged(Sample),
    /// A batch of sample updates is complete; buffered data may be flushed.
    BatchChanged,
}

/// Parameters for probing one device.
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    /// Device identifier to probe.
    pub device: String,
    /// Data item names of interest.
    pub channel_names: Vec<String>,
    /// Target number of samples per streaming request.
    pub sample_count: u32,
    /// Sampling period.
    pub update_interval: Duration,
}

/// A source of machine telemetry.
///
/// Implementations own the device protocol; the pipeline only sees the typed
/// event stream. `probe` returns the receiving half of an event channel; the
/// pipeline calls `start_streaming` once it observes
/// [`SourceEvent::ProbeCompleted`] and its upstream destinations exist.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// List the device identifiers the source is currently serving.
    async fn discover(&self) -> Result<Vec<String>, SourceError>;

    /// Probe one device and return its event stream.
    async fn probe(&self, spec: ProbeSpec) -> Result<mpsc::Receiver<SourceEvent>, SourceError>;

    /// Tell the source to begin streaming samples for the probed device.
    async fn start_streaming(&self) -> Result<(), SourceError>;
}
