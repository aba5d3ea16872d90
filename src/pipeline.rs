//! Store-and-forward pipeline core.
//!
//! Samples flow in from the telemetry source, are demultiplexed into
//! per-channel buffers, and leave again in batches: either as hub messages
//! (after the readiness/assignment handshake) or as committed blocks in the
//! object store.
//!
//! # Architecture
//!
//! - [`SampleRouter`]: maps samples to [`ChannelBuffer`]s and formats records
//! - [`HandshakeCoordinator`]: announce-then-wait destination negotiation
//! - [`FlushCoordinator`]: drain-and-dispatch on each batch boundary
//! - [`TelemetryUplink`] / [`AppendBlobWriter`]: the two delivery paths
//! - [`Pipeline`]: per-device worker event loop tying it all together

mod blob;
mod channel;
mod flush;
mod handshake;
mod router;
mod session;
mod sink;
mod uplink;
mod worker;

pub use blob::{AppendBlobWriter, HEADER_ROW};
pub use channel::{ChannelBuffer, ChannelKey};
pub use flush::{FlushCoordinator, FlushSummary};
pub use handshake::{HandshakeCoordinator, HandshakeError, HandshakeState};
pub use router::{SampleRouter, TARGET_ITEM_NAMES};
pub use session::{Destination, DestinationMap, SessionToken};
pub use sink::{BatchSink, RetryPolicy, SinkError};
pub use uplink::TelemetryUplink;
pub use worker::{Pipeline, PipelineError, PipelineSettings};
