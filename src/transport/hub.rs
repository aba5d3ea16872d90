//! Message-hub transport contract and wire envelopes.
//!
//! Outbound messages carry a JSON payload plus a free-form property map; the
//! `messageType` property discriminates message kinds. Inbound payloads are
//! decoded as a tagged union keyed by the same field, so a payload is only
//! interpreted after its kind is known.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Property key carrying the message kind.
pub const PROP_MESSAGE_TYPE: &str = "messageType";
/// Property key carrying the session token.
pub const PROP_SESSION_ID: &str = "sessionId";

/// Message kind: readiness announcement (device to hub).
pub const MSG_TYPE_READY: &str = "deviceready";
/// Message kind: destination assignment (hub to device).
pub const MSG_TYPE_ASSIGNMENT: &str = "fileupload";
/// Message kind: telemetry batch (device to hub).
pub const MSG_TYPE_TELEMETRY: &str = "machineData";

/// Errors that can occur on the hub transport.
#[derive(Debug, Error)]
pub enum HubError {
    /// Failed to send a message.
    #[error("hub send failed: {0}")]
    Send(String),

    /// Failed to receive a message.
    #[error("hub receive failed: {0}")]
    Receive(String),

    /// Failed to acknowledge a message.
    #[error("hub acknowledge failed: {0}")]
    Acknowledge(String),

    /// Payload serialization failed.
    #[error("payload encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The transport was closed.
    #[error("hub transport closed")]
    Closed,
}

/// One hub message: unique id, property map, UTF-8 JSON payload.
#[derive(Debug, Clone)]
pub struct HubMessage {
    /// Unique message id.
    pub id: String,
    /// Free-form property metadata.
    pub properties: BTreeMap<String, String>,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl HubMessage {
    /// Build an outbound message tagged with `message_type` and the session.
    pub fn tagged(message_type: &str, session_id: &str, payload: Vec<u8>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(PROP_MESSAGE_TYPE.to_string(), message_type.to_string());
        properties.insert(PROP_SESSION_ID.to_string(), session_id.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            properties,
            payload,
        }
    }

    /// The `messageType` property, if present.
    pub fn message_type(&self) -> Option<&str> {
        self.properties.get(PROP_MESSAGE_TYPE).map(String::as_str)
    }

    /// Decode the payload as a tagged inbound envelope.
    pub fn decode_inbound(&self) -> Result<InboundEnvelope, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Readiness announcement payload (`messageType=deviceready`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadinessPayload {
    pub device_name: String,
    pub session_id: String,
    /// Wire identifiers of the channels the device will stream.
    pub blob_names: Vec<String>,
}

/// Telemetry batch payload (`messageType=machineData`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TelemetryPayload {
    pub device_name: String,
    pub session_id: String,
    /// Destination the batch is bound for.
    pub blob_url: String,
    /// The extracted batch text.
    pub machine_data: String,
}

/// Inbound payloads, discriminated by the `messageType` field before any
/// other field is interpreted. Unknown kinds fail to decode and are ignored
/// by the receiver loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "messageType")]
pub enum InboundEnvelope {
    /// Per-channel destination assignment.
    #[serde(rename = "fileupload")]
    Assignment(AssignmentPayload),
}

/// Destination assignment payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentPayload {
    /// Pipe-delimited `channelId|destination` pairs.
    #[serde(rename = "fileUri")]
    pub file_uri: String,
    /// Container the destinations live in (informational).
    #[serde(rename = "blobContainerName", default)]
    pub blob_container_name: Option<String>,
}

/// Message-hub transport: send, blocking receive, acknowledge.
///
/// `receive` resolves with `None` when the hub has nothing to deliver yet;
/// callers loop. Every received message must be acknowledged exactly once,
/// regardless of how it is handled.
#[async_trait::async_trait]
pub trait HubTransport: Send + Sync + 'static {
    async fn send(&self, message: HubMessage) -> Result<(), HubError>;

    async fn receive(&self) -> Result<Option<HubMessage>, HubError>;

    async fn acknowledge(&self, message: &HubMessage) -> Result<(), HubError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_message_properties() {
        let msg = HubMessage::tagged(MSG_TYPE_READY, "dev/2024", b"{}".to_vec());
        assert_eq!(msg.message_type(), Some(MSG_TYPE_READY));
        assert_eq!(msg.properties.get(PROP_SESSION_ID).unwrap(), "dev/2024");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_inbound_assignment_decodes() {
        let msg = HubMessage {
            id: "m1".to_string(),
            properties: BTreeMap::new(),
            payload: br#"{
                "messageType": "fileupload",
                "fileUri": "EXECUTION|mem://data/x_EXECUTION",
                "blobContainerName": "data"
            }"#
            .to_vec(),
        };
        let InboundEnvelope::Assignment(payload) = msg.decode_inbound().unwrap();
        assert_eq!(payload.file_uri, "EXECUTION|mem://data/x_EXECUTION");
        assert_eq!(payload.blob_container_name.as_deref(), Some("data"));
    }

    #[test]
    fn test_inbound_unknown_kind_rejected() {
        let msg = HubMessage {
            id: "m2".to_string(),
            properties: BTreeMap::new(),
            payload: br#"{"messageType": "firmwareupdate", "fileUri": "x"}"#.to_vec(),
        };
        assert!(msg.decode_inbound().is_err());
    }

    #[test]
    fn test_readiness_payload_wire_names() {
        let payload = ReadinessPayload {
            device_name: "mill-1".to_string(),
            session_id: "mill-1/x".to_string(),
            blob_names: vec!["CONTROLLERMODE".to_string()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["DeviceName"], "mill-1");
        assert_eq!(json["SessionId"], "mill-1/x");
        assert_eq!(json["BlobNames"][0], "CONTROLLERMODE");
    }
}
