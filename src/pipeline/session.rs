//! Session tokens and destination mapping.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::pipeline::channel::ChannelKey;

/// Identifier binding a device and a session start time.
///
/// Stable for the process lifetime; correlates all outbound messages and
/// namespaces storage destinations. Separator characters in the timestamp
/// are replaced so the token is safe to embed in object names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    device: String,
    token: String,
}

impl SessionToken {
    /// Token for `device` with an explicit start instant.
    pub fn new(device: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let device = device.into();
        let token = format!("{}/{}", device, started_at.format("%m_%d_%Y_%H_%M_%S"));
        Self { device, token }
    }

    /// Token for `device` starting now.
    pub fn start(device: impl Into<String>) -> Self {
        Self::new(device, Utc::now())
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

/// An opaque write target bound to exactly one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(String);

impl Destination {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable channel → destination map for one session.
///
/// Built exactly once, either by the handshake or locally for object-store
/// mode, then read-only for the session lifetime.
#[derive(Debug, Clone)]
pub struct DestinationMap {
    map: BTreeMap<ChannelKey, Destination>,
}

impl DestinationMap {
    pub fn new(map: BTreeMap<ChannelKey, Destination>) -> Self {
        Self { map }
    }

    /// Locally generated destinations for object-store mode: one object per
    /// channel, named `{session}_{CHANNELID}` inside `container`.
    pub fn local(session: &SessionToken, container: &str) -> Self {
        let map = ChannelKey::ALL
            .iter()
            .map(|key| {
                let destination =
                    Destination::new(format!("{container}/{session}_{}", key.as_ref()));
                (*key, destination)
            })
            .collect();
        Self { map }
    }

    pub fn get(&self, key: ChannelKey) -> Option<&Destination> {
        self.map.get(&key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Channels and destinations in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelKey, &Destination)> {
        self.map.iter().map(|(k, d)| (*k, d))
    }
}
