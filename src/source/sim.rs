//! Simulated telemetry source.
//!
//! Generates a plausible stream of controller samples without any device
//! attached. Used by the `--simulate` mode of the binary and by integration
//! tests; the event/streaming semantics match what a real protocol client
//! must provide.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::source::traits::{
    ProbeSpec, Sample, SourceError, SourceEvent, TelemetrySource, DEFAULT_EVENT_CAPACITY,
};

fn default_device() -> String {
    "sim-mill-1".to_string()
}

/// Configuration for the simulated source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSourceConfig {
    /// Device identifiers the simulator reports from `discover`.
    #[serde(default = "default_device")]
    pub device: String,
    /// Stop after this many batches; `None` streams until the receiver drops.
    #[serde(default)]
    pub max_batches: Option<u64>,
}

impl Default for SimSourceConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            max_batches: None,
        }
    }
}

/// A telemetry source that fabricates samples on a timer.
///
/// Streaming is gated exactly like a real source: samples only flow after
/// [`TelemetrySource::start_streaming`] is called, which the pipeline does
/// once its destinations exist.
pub struct SimSource {
    config: SimSourceConfig,
    start_tx: watch::Sender<bool>,
    probed: AtomicBool,
}

impl SimSource {
    pub fn new(config: SimSourceConfig) -> Self {
        let (start_tx, _) = watch::channel(false);
        Self {
            config,
            start_tx,
            probed: AtomicBool::new(false),
        }
    }

    /// One batch worth of samples, deterministic in the batch index.
    fn batch_samples(batch: u64, seq: &mut u64) -> Vec<Sample> {
        let now = Utc::now();
        let mut mk = |name: &str, subtype: &str, value: String| {
            let sample = Sample {
                name: name.to_string(),
                subtype: subtype.to_string(),
                value,
                timestamp: now,
                sequence: *seq,
            };
            *seq += 1;
            sample
        };

        let mode = if batch % 7 == 0 { "MANUAL" } else { "AUTOMATIC" };
        let exec = if batch % 5 == 0 { "READY" } else { "ACTIVE" };
        let feed = 120.0 + (batch % 40) as f64 * 2.5;
        let speed = 3000.0 + (batch % 20) as f64 * 50.0;

        let mut samples = vec![
            mk("controllermode", "", mode.to_string()),
            mk("execution", "", exec.to_string()),
            mk("pathfeedrate", "ACTUAL", format!("{feed}")),
            mk("spindlespeed", "ACTUAL", format!("{speed}")),
            mk("rapidoverride", "", format!("{}", 100 - (batch % 4) * 25)),
        ];
        // Commanded variants exercise the subtype filter downstream.
        samples.push(mk("pathfeedrate", "COMMANDED", format!("{}", feed + 10.0)));
        if batch % 10 == 0 {
            samples.push(mk("program", "", format!("O{:04}", 1000 + batch / 10)));
            samples.push(mk("toolnumber", "", format!("{}", 1 + batch % 12)));
        }
        samples
    }
}

#[async_trait::async_trait]
impl TelemetrySource for SimSource {
    async fn discover(&self) -> Result<Vec<String>, SourceError> {
        Ok(vec![self.config.device.clone()])
    }

    async fn probe(&self, spec: ProbeSpec) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        if spec.device != self.config.device {
            return Err(SourceError::DeviceUnavailable(spec.device));
        }
        self.probed.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);
        let mut start_rx = self.start_tx.subscribe();
        let max_batches = self.config.max_batches;
        let device = self.config.device.clone();

        tokio::spawn(async move {
            if tx.send(SourceEvent::ProbeCompleted).await.is_err() {
                return;
            }

            // Hold samples until the pipeline asks for streaming.
            while !*start_rx.borrow() {
                if start_rx.changed().await.is_err() {
                    return;
                }
            }

            let mut ticker = tokio::time::interval(spec.update_interval);
            let mut seq = 1u64;
            let mut batch = 0u64;
            loop {
                ticker.tick().await;
                for sample in SimSource::batch_samples(batch, &mut seq) {
                    if tx.send(SourceEvent::SampleChanged(sample)).await.is_err() {
                        return;
                    }
                }
                if tx.send(SourceEvent::BatchChanged).await.is_err() {
                    return;
                }
                batch += 1;
                if max_batches.is_some_and(|max| batch >= max) {
                    tracing::info!(device = %device, batches = batch, "Simulated stream complete");
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn start_streaming(&self) -> Result<(), SourceError> {
        if !self.probed.load(Ordering::SeqCst) {
            return Err(SourceError::NotProbed);
        }
        let _ = self.start_tx.send(true);
        Ok(())
    }
}
