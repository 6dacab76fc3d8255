//! Error types for the push orchestrator.

use crate::status::NodeStatus;
use thiserror::Error;

/// Result type for push operations.
pub type PushResult<T> = Result<T, PushError>;

/// Errors that can occur during a push run.
///
/// Node-scoped errors fail a single node and let the run continue. The rest
/// end the run early; `PushService::push_data` still returns the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The local node identity could not be resolved.
    #[error("local node identity is not available")]
    IdentityUnavailable,

    /// The local node has synchronization turned off.
    #[error("sync is disabled for local node {node_id}")]
    SyncDisabled {
        /// Local node ID.
        node_id: String,
    },

    /// The local node has no matching security row.
    #[error("no node security row for {node_id}")]
    SecurityMissing {
        /// Local node ID.
        node_id: String,
    },

    /// A transport session to the remote node could not be opened.
    #[error("transport to {node_id} unavailable: {reason}")]
    TransportUnavailable {
        /// Remote node ID.
        node_id: String,
        /// Error message.
        reason: String,
        /// Whether the remote rejected our credentials.
        auth_rejected: bool,
    },

    /// The extractor failed while producing batches.
    #[error("extraction for {node_id} failed: {reason}")]
    ExtractionFailure {
        /// Remote node ID.
        node_id: String,
        /// Error message.
        reason: String,
    },

    /// A blocking collaborator call ran past its deadline.
    #[error("push to {node_id} timed out")]
    Timeout {
        /// Remote node ID.
        node_id: String,
    },

    /// The run was cancelled.
    #[error("push cancelled")]
    Cancelled,
}

impl PushError {
    /// Creates a transport error for an unreachable remote.
    pub fn transport_unavailable(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            node_id: node_id.into(),
            reason: reason.into(),
            auth_rejected: false,
        }
    }

    /// Creates a transport error for rejected credentials.
    pub fn auth_rejected(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            node_id: node_id.into(),
            reason: reason.into(),
            auth_rejected: true,
        }
    }

    /// Creates an extraction error.
    pub fn extraction_failure(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtractionFailure {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error only fails the node it was raised for.
    pub fn is_node_scoped(&self) -> bool {
        matches!(
            self,
            PushError::TransportUnavailable { .. }
                | PushError::ExtractionFailure { .. }
                | PushError::Timeout { .. }
        )
    }

    /// Maps the error to the status reported for the node.
    pub fn node_status(&self) -> NodeStatus {
        match self {
            PushError::TransportUnavailable {
                auth_rejected: true,
                ..
            } => NodeStatus::NotAuthorized,
            PushError::TransportUnavailable { .. } | PushError::Timeout { .. } => {
                NodeStatus::Offline
            }
            PushError::SyncDisabled { .. } => NodeStatus::SyncDisabled,
            PushError::SecurityMissing { .. } => NodeStatus::NotAuthorized,
            _ => NodeStatus::UnknownError,
        }
    }
}
