//! Telemetry source contract.
//!
//! The agent does not talk to machine controllers itself; it consumes a typed
//! stream of named samples from a [`TelemetrySource`] implementation. The
//! source delivers events over an MPSC channel: individual sample updates,
//! batch boundaries, and probe completion. Concrete protocol clients live
//! outside this crate; [`SimSource`] is a built-in generator for local runs
//! and tests.

mod sim;
mod traits;

pub use sim::{SimSource, SimSourceConfig};
pub use traits::{ProbeSpec, Sample, SourceError, SourceEvent, TelemetrySource};
