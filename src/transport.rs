//! Transport contracts for the message hub and the object store.
//!
//! The agent never owns a concrete remote client: it talks to a
//! [`HubTransport`] (send / blocking receive / acknowledge, with property
//! metadata) and an [`ObjectStore`] (block put / block-list get / block-list
//! commit). [`MemoryHub`] and [`MemoryStore`] implement both contracts
//! in-process for simulation runs and tests.

pub mod hub;
mod memory;
pub mod store;

pub use hub::{
    AssignmentPayload, HubError, HubMessage, HubTransport, InboundEnvelope, ReadinessPayload,
    TelemetryPayload, MSG_TYPE_ASSIGNMENT, MSG_TYPE_READY, MSG_TYPE_TELEMETRY, PROP_MESSAGE_TYPE,
    PROP_SESSION_ID,
};
pub use memory::{MemoryHub, MemoryStore};
pub use store::{BlockId, ObjectStore, StoreError};
