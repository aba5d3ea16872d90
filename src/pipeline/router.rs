//! Sample demultiplexing into per-channel buffers.

use std::collections::BTreeMap;

use crate::pipeline::channel::{ChannelBuffer, ChannelKey};
use crate::source::Sample;

/// Data item names requested from the telemetry source: every alias the
/// router knows how to map.
pub const TARGET_ITEM_NAMES: [&str; 10] = [
    "mode",
    "controllermode",
    "execution",
    "program",
    "toolnumber",
    "path_feedrate1",
    "pathfeedrate",
    "s1speed",
    "spindlespeed",
    "rapidoverride",
];

/// Routes incoming samples to channel buffers.
///
/// Owns one buffer per known channel. Routing appends a formatted record
/// line to at most one buffer; samples whose name/subtype match no channel
/// are dropped without error. The router is owned by the pipeline worker,
/// which serializes routing against flushing.
#[derive(Debug)]
pub struct SampleRouter {
    buffers: BTreeMap<ChannelKey, ChannelBuffer>,
}

impl SampleRouter {
    pub fn new() -> Self {
        let buffers = ChannelKey::ALL
            .iter()
            .map(|key| (*key, ChannelBuffer::new()))
            .collect();
        Self { buffers }
    }

    /// Route one sample. Unmapped samples have no observable effect.
    pub fn route(&mut self, sample: &Sample) {
        let Some(key) = Self::channel_for(&sample.name, &sample.subtype) else {
            tracing::trace!(name = %sample.name, subtype = %sample.subtype, "Sample unmapped, dropped");
            return;
        };

        let line = Self::format_line(sample);
        if let Some(buffer) = self.buffers.get_mut(&key) {
            buffer.append(&line);
        }
    }

    /// Drain one channel's buffer, if it has pending data.
    pub fn drain(&mut self, key: ChannelKey) -> Option<String> {
        self.buffers.get_mut(&key)?.drain_if_non_empty()
    }

    /// Total buffered lines across all channels (diagnostic only).
    pub fn buffered_lines(&self) -> usize {
        self.buffers.values().map(ChannelBuffer::line_count).sum()
    }

    /// Map a sample's name/subtype to its channel.
    ///
    /// Name matching is case-insensitive and covers the aliases devices
    /// report; the feedrate and spindle-speed channels additionally require
    /// the ACTUAL subtype, so commanded variants are dropped.
    fn channel_for(name: &str, subtype: &str) -> Option<ChannelKey> {
        let actual = subtype.eq_ignore_ascii_case("ACTUAL");
        match name.to_ascii_lowercase().as_str() {
            "mode" | "controllermode" => Some(ChannelKey::ControllerMode),
            "execution" => Some(ChannelKey::Execution),
            "program" => Some(ChannelKey::Program),
            "toolnumber" => Some(ChannelKey::ToolId),
            "rapidoverride" => Some(ChannelKey::RapidOverride),
            "path_feedrate1" | "pathfeedrate" if actual => Some(ChannelKey::PathFeedrateActual),
            "s1speed" | "spindlespeed" if actual => Some(ChannelKey::SpindleSpeedActual),
            _ => None,
        }
    }

    /// Record line: `{timestamp},{unix_epoch_seconds},{value},{sequence}`.
    ///
    /// The timestamp format and epoch conversion are locale-independent;
    /// epoch is fractional seconds since 1970-01-01T00:00:00Z.
    fn format_line(sample: &Sample) -> String {
        let timestamp = sample.timestamp.format("%m/%d/%Y %I:%M:%S%.3f %p");
        let epoch = sample.timestamp.timestamp_millis() as f64 / 1000.0;
        format!("{timestamp},{epoch},{},{}", sample.value, sample.sequence)
    }
}

impl Default for SampleRouter {
    fn default() -> Self {
        Self::new()
    }
}
