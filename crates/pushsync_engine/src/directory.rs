//! Node directory and channel configuration collaborators.

use parking_lot::RwLock;
use pushsync_model::{Channel, ChannelMap, Node, NodeSecurity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Resolves the local identity, security rows and push targets.
pub trait NodeDirectory: Send + Sync {
    /// Returns the local node, if it has been registered.
    fn find_identity(&self) -> Option<Node>;

    /// Returns the security row for `node_id`.
    fn find_node_security(&self, node_id: &str) -> Option<NodeSecurity>;

    /// Returns the remote nodes that should receive a push, in push order.
    fn find_nodes_to_push_to(&self) -> Vec<Node>;
}

/// Supplies channel definitions.
pub trait ConfigurationService: Send + Sync {
    /// Returns the configured channels. `refresh` bypasses any cache.
    fn channels(&self, refresh: bool) -> ChannelMap;
}

/// An in-memory node directory for testing.
#[derive(Debug, Default)]
pub struct MemoryNodeDirectory {
    identity: RwLock<Option<Node>>,
    security: RwLock<HashMap<String, NodeSecurity>>,
    push_targets: RwLock<Vec<Node>>,
    identity_lookups: AtomicU64,
}

impl MemoryNodeDirectory {
    /// Creates an empty directory (no identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local identity.
    pub fn set_identity(&self, identity: Node) {
        *self.identity.write() = Some(identity);
    }

    /// Removes the local identity.
    pub fn clear_identity(&self) {
        *self.identity.write() = None;
    }

    /// Adds or replaces a security row.
    pub fn add_security(&self, security: NodeSecurity) {
        self.security
            .write()
            .insert(security.node_id.clone(), security);
    }

    /// Removes the security row for `node_id`.
    pub fn remove_security(&self, node_id: &str) {
        self.security.write().remove(node_id);
    }

    /// Appends a push target.
    pub fn add_push_target(&self, node: Node) {
        self.push_targets.write().push(node);
    }

    /// Number of `find_identity` calls served.
    pub fn identity_lookups(&self) -> u64 {
        self.identity_lookups.load(Ordering::SeqCst)
    }
}

impl NodeDirectory for MemoryNodeDirectory {
    fn find_identity(&self) -> Option<Node> {
        self.identity_lookups.fetch_add(1, Ordering::SeqCst);
        self.identity.read().clone()
    }

    fn find_node_security(&self, node_id: &str) -> Option<NodeSecurity> {
        self.security.read().get(node_id).cloned()
    }

    fn find_nodes_to_push_to(&self) -> Vec<Node> {
        self.push_targets.read().clone()
    }
}

/// An in-memory channel configuration for testing.
#[derive(Debug, Default)]
pub struct MemoryConfiguration {
    channels: RwLock<ChannelMap>,
}

impl MemoryConfiguration {
    /// Creates a configuration with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from a list of channels.
    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let config = Self::new();
        for channel in channels {
            config.add_channel(channel);
        }
        config
    }

    /// Adds or replaces a channel.
    pub fn add_channel(&self, channel: Channel) {
        self.channels
            .write()
            .insert(channel.channel_id.clone(), channel);
    }
}

impl ConfigurationService for MemoryConfiguration {
    fn channels(&self, _refresh: bool) -> ChannelMap {
        self.channels.read().clone()
    }
}
