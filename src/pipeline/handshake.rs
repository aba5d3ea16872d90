//! Readiness/assignment handshake.
//!
//! The remote side pre-allocates per-channel write destinations before any
//! data exists, so the collector announces readiness and then waits until an
//! assignment arrives. Nothing is routed or streamed before the handshake
//! reaches `Ready`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::channel::ChannelKey;
use crate::pipeline::session::{Destination, DestinationMap, SessionToken};
use crate::transport::hub::{
    HubError, HubMessage, HubTransport, InboundEnvelope, ReadinessPayload, MSG_TYPE_READY,
};

/// Errors that abort the handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The assignment carried fewer destinations than there are channels.
    /// Fatal to the session: streaming never starts.
    #[error("assignment incomplete: expected {expected} destinations, got {got}")]
    IncompleteAssignment { expected: usize, got: usize },

    /// No assignment arrived within the configured deadline.
    #[error("no destination assignment within {0:?}")]
    Timeout(Duration),

    /// Hub transport failure.
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Handshake progression. `Aborted` is reachable from `AwaitingAssignment`;
/// `Ready` is terminal for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Announcing,
    AwaitingAssignment,
    Ready,
    Aborted,
}

/// Runs the two-message handshake for one device session.
pub struct HandshakeCoordinator<H> {
    hub: Arc<H>,
    session: SessionToken,
    timeout: Duration,
    state: HandshakeState,
}

impl<H: HubTransport> HandshakeCoordinator<H> {
    pub fn new(hub: Arc<H>, session: SessionToken, timeout: Duration) -> Self {
        Self {
            hub,
            session,
            timeout,
            state: HandshakeState::Announcing,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Announce readiness, then wait for the destination assignment.
    ///
    /// # Errors
    /// `IncompleteAssignment` and `Timeout` leave the coordinator `Aborted`;
    /// the caller must terminate the pipeline for this device.
    pub async fn run(&mut self) -> Result<DestinationMap, HandshakeError> {
        self.announce().await?;

        let waited = tokio::time::timeout(self.timeout, self.await_assignment()).await;
        let result = match waited {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::Timeout(self.timeout)),
        };

        match result {
            Ok(map) => {
                self.state = HandshakeState::Ready;
                for (key, destination) in map.iter() {
                    tracing::info!(
                        device = %self.session.device(),
                        channel = %key,
                        destination = %destination,
                        "Destination assigned"
                    );
                }
                Ok(map)
            }
            Err(e) => {
                self.state = HandshakeState::Aborted;
                Err(e)
            }
        }
    }

    /// Send the readiness message carrying the session token and the fixed
    /// channel list.
    async fn announce(&mut self) -> Result<(), HandshakeError> {
        let payload = ReadinessPayload {
            device_name: self.session.device().to_string(),
            session_id: self.session.as_str().to_string(),
            blob_names: ChannelKey::wire_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };
        let bytes = serde_json::to_vec(&payload).map_err(HubError::Encode)?;
        let message = HubMessage::tagged(MSG_TYPE_READY, self.session.as_str(), bytes);

        self.hub.send(message).await?;
        tracing::info!(device = %self.session.device(), "Announced ready, awaiting assignment");
        self.state = HandshakeState::AwaitingAssignment;
        Ok(())
    }

    /// Receive until an assignment message arrives.
    ///
    /// Every received message is acknowledged exactly once, whether it is
    /// the assignment, a foreign message kind, or undecodable.
    async fn await_assignment(&self) -> Result<DestinationMap, HandshakeError> {
        loop {
            let Some(message) = self.hub.receive().await? else {
                continue;
            };
            let decoded = message.decode_inbound();
            self.hub.acknowledge(&message).await?;

            match decoded {
                Ok(InboundEnvelope::Assignment(assignment)) => {
                    if let Some(container) = assignment.blob_container_name.as_deref() {
                        tracing::info!(
                            device = %self.session.device(),
                            container,
                            "Received destination assignment"
                        );
                    }
                    return self.parse_assignment(&assignment.file_uri);
                }
                Err(e) => {
                    tracing::debug!(
                        message_id = %message.id,
                        error = %e,
                        "Ignoring non-assignment message"
                    );
                }
            }
        }
    }

    /// Parse pipe-delimited `channelId|destination` pairs into the map.
    fn parse_assignment(&self, file_uri: &str) -> Result<DestinationMap, HandshakeError> {
        let mut map = BTreeMap::new();
        let mut fields = file_uri.split('|');
        while let Some(name) = fields.next() {
            let Some(target) = fields.next() else { break };
            match ChannelKey::from_str(name.trim()) {
                Ok(key) => {
                    map.insert(key, Destination::new(target));
                }
                Err(_) => {
                    tracing::warn!(channel = name, "Unknown channel in assignment, skipped");
                }
            }
        }

        if map.len() < ChannelKey::COUNT {
            return Err(HandshakeError::IncompleteAssignment {
                expected: ChannelKey::COUNT,
                got: map.len(),
            });
        }
        Ok(DestinationMap::new(map))
    }
}
