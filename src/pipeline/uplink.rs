//! Telemetry delivery over the message hub.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pipeline::channel::ChannelKey;
use crate::pipeline::session::{Destination, SessionToken};
use crate::pipeline::sink::{BatchSink, RetryPolicy, SinkError};
use crate::transport::hub::{HubMessage, HubTransport, TelemetryPayload, MSG_TYPE_TELEMETRY};

/// Sends extracted batches to their assigned destinations as `machineData`
/// messages.
///
/// Each batch is sent exactly once per extraction. Transient send failures
/// are retried under the configured policy with the cancellation token
/// checked between attempts; exhaustion surfaces as
/// [`SinkError::Exhausted`] instead of blocking the flush forever.
pub struct TelemetryUplink<H> {
    hub: Arc<H>,
    session: SessionToken,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<H: HubTransport> TelemetryUplink<H> {
    pub fn new(
        hub: Arc<H>,
        session: SessionToken,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub,
            session,
            policy,
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl<H: HubTransport> BatchSink for TelemetryUplink<H> {
    async fn deliver(
        &self,
        channel: ChannelKey,
        destination: &Destination,
        text: String,
    ) -> Result<(), SinkError> {
        let payload = TelemetryPayload {
            device_name: self.session.device().to_string(),
            session_id: self.session.as_str().to_string(),
            blob_url: destination.as_str().to_string(),
            machine_data: text,
        };
        let bytes = serde_json::to_vec(&payload)?;
        let message = HubMessage::tagged(MSG_TYPE_TELEMETRY, self.session.as_str(), bytes);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.hub.send(message.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        device = %self.session.device(),
                        channel = %channel,
                        destination = %destination,
                        attempt,
                        "Batch delivered"
                    );
                    return Ok(());
                }
                Err(e) if attempt >= self.policy.max_attempts => {
                    tracing::error!(
                        device = %self.session.device(),
                        channel = %channel,
                        error = %e,
                        attempts = attempt,
                        "Delivery abandoned"
                    );
                    return Err(SinkError::Exhausted {
                        destination: destination.as_str().to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let backoff = self.policy.backoff(attempt);
                    tracing::warn!(
                        device = %self.session.device(),
                        channel = %channel,
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Send failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(SinkError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }
}
