//! Batch delivery contract shared by the hub and object-store paths.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::channel::ChannelKey;
use crate::pipeline::session::Destination;

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

/// Bounded retry with exponential backoff.
///
/// Attempts are capped and the backoff doubles per attempt up to a ceiling;
/// a sink never blocks forever on one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per payload, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt.
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Backoff ceiling.
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after the given 1-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let scaled = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exp));
        scaled.min(self.max_backoff)
    }
}

/// Errors surfaced by a delivery path.
#[derive(Debug, Error)]
pub enum SinkError {
    /// All attempts for one payload failed; the batch is abandoned.
    #[error("delivery to '{destination}' abandoned after {attempts} attempts")]
    Exhausted { destination: String, attempts: u32 },

    /// Shutdown was requested between attempts.
    #[error("delivery cancelled")]
    Cancelled,

    /// The outbound payload could not be encoded.
    #[error("payload encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Delivers one channel's extracted batch to its assigned destination.
///
/// Implementations must treat each call as a single logical upload: the
/// batch text was already removed from its buffer and will not be offered
/// again, so a sink retries internally (bounded) before giving up.
#[async_trait::async_trait]
pub trait BatchSink: Send + Sync + 'static {
    async fn deliver(
        &self,
        channel: ChannelKey,
        destination: &Destination,
        text: String,
    ) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(450),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(450));
        assert_eq!(policy.backoff(30), Duration::from_millis(450));
    }
}
