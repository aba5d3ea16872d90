//! Logical channel identifiers and per-channel text buffers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One logical stream of a physical quantity, buffered and forwarded
/// independently of the others.
///
/// The set is closed and known at startup: samples that do not map to any
/// channel are discarded by the router. The wire identifier (used in the
/// readiness announcement and in assignment payloads) is the uppercase
/// variant name, e.g. `CONTROLLERMODE`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ChannelKey {
    /// Controller operating mode (AUTOMATIC, MANUAL, ...).
    ControllerMode,
    /// Program execution state (ACTIVE, STOPPED, ...).
    Execution,
    /// Actual path feedrate.
    PathFeedrateActual,
    /// Active part program name.
    Program,
    /// Rapid traverse override percentage.
    RapidOverride,
    /// Actual spindle speed.
    SpindleSpeedActual,
    /// Identifier of the tool currently in the spindle.
    ToolId,
}

impl ChannelKey {
    /// All channels, in stable wire order.
    pub const ALL: [ChannelKey; 7] = [
        ChannelKey::ControllerMode,
        ChannelKey::Execution,
        ChannelKey::PathFeedrateActual,
        ChannelKey::Program,
        ChannelKey::RapidOverride,
        ChannelKey::SpindleSpeedActual,
        ChannelKey::ToolId,
    ];

    /// Number of known channels.
    pub const COUNT: usize = Self::ALL.len();

    /// Wire identifiers for all channels, in the same order as [`ALL`](Self::ALL).
    pub fn wire_ids() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_ref()).collect()
    }
}

/// Accumulates formatted record lines for one channel.
///
/// The buffer is exclusively owned by the pipeline worker: appends and drains
/// never race because both happen on the owner's event loop. Draining moves
/// the accumulated text out and resets the buffer, so no line is ever
/// delivered twice.
#[derive(Debug, Default)]
pub struct ChannelBuffer {
    text: String,
    lines: usize,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record line. A trailing newline is added here so callers
    /// pass bare lines.
    pub fn append(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        self.lines += 1;
    }

    /// Take the accumulated text and reset the buffer, or `None` when empty.
    ///
    /// The `None` case is what prevents zero-length uploads: a channel with
    /// no pending data produces no dispatch at all.
    pub fn drain_if_non_empty(&mut self) -> Option<String> {
        if self.text.is_empty() {
            return None;
        }
        self.lines = 0;
        Some(std::mem::take(&mut self.text))
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of buffered lines (diagnostic only).
    pub fn line_count(&self) -> usize {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_wire_id_roundtrip() {
        assert_eq!(ChannelKey::ControllerMode.as_ref(), "CONTROLLERMODE");
        assert_eq!(ChannelKey::SpindleSpeedActual.as_ref(), "SPINDLESPEEDACTUAL");
        assert_eq!(
            ChannelKey::from_str("PATHFEEDRATEACTUAL").unwrap(),
            ChannelKey::PathFeedrateActual
        );
        // Parsing is case-insensitive.
        assert_eq!(
            ChannelKey::from_str("toolid").unwrap(),
            ChannelKey::ToolId
        );
    }

    #[test]
    fn test_wire_ids_cover_all_channels() {
        let ids = ChannelKey::wire_ids();
        assert_eq!(ids.len(), ChannelKey::COUNT);
        assert_eq!(ids[0], "CONTROLLERMODE");
        assert_eq!(ids[6], "TOOLID");
    }

    #[test]
    fn test_drain_empty_is_none_and_idempotent() {
        let mut buf = ChannelBuffer::new();
        assert!(buf.drain_if_non_empty().is_none());
        assert!(buf.drain_if_non_empty().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_append_then_drain_resets() {
        let mut buf = ChannelBuffer::new();
        buf.append("a,1");
        buf.append("b,2");
        assert_eq!(buf.line_count(), 2);

        let text = buf.drain_if_non_empty().unwrap();
        assert_eq!(text, "a,1\nb,2\n");
        assert!(buf.is_empty());
        assert_eq!(buf.line_count(), 0);
        assert!(buf.drain_if_non_empty().is_none());
    }

    #[test]
    fn test_no_line_lost_or_duplicated_across_drains() {
        let mut buf = ChannelBuffer::new();
        let mut drained = String::new();
        let mut appended = String::new();

        for round in 0..5 {
            for i in 0..3 {
                let line = format!("r{round}l{i}");
                appended.push_str(&line);
                appended.push('\n');
                buf.append(&line);
            }
            drained.push_str(&buf.drain_if_non_empty().unwrap());
        }

        assert_eq!(drained, appended);
    }
}
