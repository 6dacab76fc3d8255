//! Node identity and security rows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node participating in synchronization.
///
/// `Node` is an immutable snapshot handed out by the node directory for the
/// duration of one push run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node ID.
    pub node_id: String,
    /// Group the node belongs to.
    pub node_group_id: String,
    /// External (user facing) ID.
    pub external_id: String,
    /// Whether synchronization is enabled for this node.
    #[serde(default = "default_sync_enabled")]
    pub sync_enabled: bool,
}

fn default_sync_enabled() -> bool {
    true
}

impl Node {
    /// Creates a new sync-enabled node.
    pub fn new(
        node_id: impl Into<String>,
        node_group_id: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_group_id: node_group_id.into(),
            external_id: external_id.into(),
            sync_enabled: true,
        }
    }

    /// Sets the sync-enabled flag.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Returns `group:external:id`, the form used in log lines.
    pub fn label(&self) -> String {
        format!(
            "{}:{}:{}",
            self.node_group_id, self.external_id, self.node_id
        )
    }
}

/// Credential material for a node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSecurity {
    /// Node ID this row belongs to.
    pub node_id: String,
    /// Shared password used to authenticate pushes.
    pub node_password: String,
}

impl NodeSecurity {
    /// Creates a new security row.
    pub fn new(node_id: impl Into<String>, node_password: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_password: node_password.into(),
        }
    }
}

// The password never shows up in logs.
impl fmt::Debug for NodeSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSecurity")
            .field("node_id", &self.node_id)
            .field("node_password", &"<redacted>")
            .finish()
    }
}
