//! Channel definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channels keyed by channel ID.
pub type ChannelMap = BTreeMap<String, Channel>;

/// A configured grouping of changes.
///
/// Channels scope which changes are eligible for extraction. A channel with
/// `reload_flag` set carries the traffic produced by full-resync requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID.
    pub channel_id: String,
    /// Whether batches on this channel are reload batches.
    #[serde(default)]
    pub reload_flag: bool,
    /// Whether the channel is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// Creates an enabled, non-reload channel.
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            reload_flag: false,
            enabled: true,
        }
    }

    /// Creates an enabled reload channel.
    pub fn reload(channel_id: impl Into<String>) -> Self {
        Self {
            reload_flag: true,
            ..Self::new(channel_id)
        }
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
