//! Per-device pipeline worker.
//!
//! One worker task per physical data source. The worker owns the sample
//! router and its buffers, so routing and flushing are mutually exclusive by
//! construction: both happen on the worker's event loop, never concurrently.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::pipeline::blob::AppendBlobWriter;
use crate::pipeline::flush::FlushCoordinator;
use crate::pipeline::handshake::{HandshakeCoordinator, HandshakeError};
use crate::pipeline::router::{SampleRouter, TARGET_ITEM_NAMES};
use crate::pipeline::session::{DestinationMap, SessionToken};
use crate::pipeline::sink::{BatchSink, RetryPolicy};
use crate::pipeline::uplink::TelemetryUplink;
use crate::source::{ProbeSpec, SourceError, SourceEvent, TelemetrySource};
use crate::transport::hub::HubTransport;
use crate::transport::store::ObjectStore;

/// Liveness log period while streaming.
const LIVENESS_PERIOD: Duration = Duration::from_secs(15);

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Errors that terminate a device pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The handshake aborted; streaming never started for this device.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The telemetry source failed.
    #[error("source failed: {0}")]
    Source(#[from] SourceError),
}

/// Tunables for one pipeline instance, carved out of the application config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Target samples per streaming request.
    pub sample_count: u32,
    /// Sampling period handed to the source.
    pub update_interval: Duration,
    /// Deadline for the destination assignment.
    pub handshake_timeout: Duration,
    /// Retry policy for both delivery paths.
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sample_count: 100,
            update_interval: Duration::from_secs(1),
            handshake_timeout: default_handshake_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Store-and-forward pipeline for one device.
pub struct Pipeline<Src> {
    source: Arc<Src>,
    session: SessionToken,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl<Src: TelemetrySource> Pipeline<Src> {
    pub fn new(
        source: Arc<Src>,
        session: SessionToken,
        settings: PipelineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            session,
            settings,
            cancel,
        }
    }

    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    /// Run with the message-hub delivery path: handshake for destinations,
    /// then stream batches as `machineData` messages.
    pub async fn run_with_hub<H: HubTransport>(self, hub: Arc<H>) -> Result<(), PipelineError> {
        let mut handshake = HandshakeCoordinator::new(
            Arc::clone(&hub),
            self.session.clone(),
            self.settings.handshake_timeout,
        );
        let destinations = handshake.run().await?;

        let uplink = TelemetryUplink::new(
            hub,
            self.session.clone(),
            self.settings.retry.clone(),
            self.cancel.clone(),
        );
        self.stream(destinations, Arc::new(uplink)).await
    }

    /// Run with the object-store delivery path: the hub is bypassed and
    /// destinations are generated locally, namespaced by the session token.
    pub async fn run_with_store<S: ObjectStore>(
        self,
        store: Arc<S>,
        container: &str,
    ) -> Result<(), PipelineError> {
        let destinations = DestinationMap::local(&self.session, container);
        for (key, destination) in destinations.iter() {
            tracing::info!(
                device = %self.session.device(),
                channel = %key,
                destination = %destination,
                "Local destination"
            );
        }

        let writer = AppendBlobWriter::new(
            store,
            self.settings.retry.clone(),
            self.cancel.clone(),
        );
        self.stream(destinations, Arc::new(writer)).await
    }

    /// Probe the source and run the event loop until the source ends or
    /// shutdown is requested. A final flush drains whatever is buffered.
    async fn stream<K: BatchSink>(
        self,
        destinations: DestinationMap,
        sink: Arc<K>,
    ) -> Result<(), PipelineError> {
        let spec = ProbeSpec {
            device: self.session.device().to_string(),
            channel_names: TARGET_ITEM_NAMES.iter().map(|s| s.to_string()).collect(),
            sample_count: self.settings.sample_count,
            update_interval: self.settings.update_interval,
        };
        let mut events = self.source.probe(spec).await?;

        let flush = FlushCoordinator::new(sink, destinations);
        let mut router = SampleRouter::new();
        let mut heartbeat = tokio::time::interval(LIVENESS_PERIOD);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(device = %self.session.device(), "Reading data from the machine");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(device = %self.session.device(), "Shutdown requested");
                    break;
                }
                _ = heartbeat.tick() => {
                    tracing::info!(
                        device = %self.session.device(),
                        buffered_lines = router.buffered_lines(),
                        "Collecting"
                    );
                }
                event = events.recv() => match event {
                    Some(SourceEvent::ProbeCompleted) => {
                        // Destinations exist by now, safe to open the tap.
                        self.source.start_streaming().await?;
                        tracing::info!(device = %self.session.device(), "Streaming started");
                    }
                    Some(SourceEvent::SampleChanged(sample)) => router.route(&sample),
                    Some(SourceEvent::BatchChanged) => {
                        let summary = flush.flush_batch(&mut router).await;
                        for (channel, error) in &summary.failures {
                            tracing::error!(
                                device = %self.session.device(),
                                channel = %channel,
                                error = %error,
                                "Batch lost"
                            );
                        }
                    }
                    None => {
                        tracing::info!(device = %self.session.device(), "Source stream ended");
                        break;
                    }
                }
            }
        }

        // Deliver anything still buffered before handing the task back.
        let summary = flush.flush_batch(&mut router).await;
        if summary.dispatched > 0 {
            tracing::info!(
                device = %self.session.device(),
                uploads = summary.dispatched,
                failed = summary.failures.len(),
                "Final flush complete"
            );
        }
        Ok(())
    }
}
