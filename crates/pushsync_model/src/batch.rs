//! Outgoing batches.

use serde::{Deserialize, Serialize};

/// A unit of grouped changes extracted for one remote node.
///
/// Only the counters the orchestrator needs are carried here; the payload
/// itself is owned by the extractor and the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingBatch {
    /// Batch ID.
    pub batch_id: u64,
    /// Target node ID.
    pub node_id: String,
    /// Channel the batch was extracted from.
    pub channel_id: String,
    /// Number of change rows/events in the batch.
    #[serde(default)]
    pub data_event_count: u64,
    /// Serialized size in bytes.
    #[serde(default)]
    pub byte_count: u64,
    /// Whether the batch was generated to satisfy a reload request.
    #[serde(default)]
    pub load_flag: bool,
}

impl OutgoingBatch {
    /// Creates a new batch.
    pub fn new(
        batch_id: u64,
        node_id: impl Into<String>,
        channel_id: impl Into<String>,
        data_event_count: u64,
    ) -> Self {
        Self {
            batch_id,
            node_id: node_id.into(),
            channel_id: channel_id.into(),
            data_event_count,
            byte_count: 0,
            load_flag: false,
        }
    }

    /// Marks the batch as a reload batch.
    pub fn with_load_flag(mut self, load_flag: bool) -> Self {
        self.load_flag = load_flag;
        self
    }

    /// Sets the serialized size.
    pub fn with_byte_count(mut self, byte_count: u64) -> Self {
        self.byte_count = byte_count;
        self
    }
}
