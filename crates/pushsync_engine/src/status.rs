//! Per-node push status and the registry returned by a push run.

use crate::config::BatchCountMode;
use crate::error::PushError;
use pushsync_model::{ChannelMap, OutgoingBatch};
use serde::Serialize;
use std::collections::HashMap;

/// Outcome reported for a remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// The remote node could not be reached.
    Offline,
    /// The remote node is busy.
    Busy,
    /// The remote node rejected our credentials.
    NotAuthorized,
    /// Synchronization is disabled.
    SyncDisabled,
    /// Any other failure.
    UnknownError,
    /// Nothing was sent.
    #[default]
    NoData,
    /// At least one batch was sent.
    DataProcessed,
}

/// Counters for one remote node over one push run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RemoteNodeStatus {
    node_id: String,
    status: NodeStatus,
    batches_processed: u64,
    data_processed: u64,
    reload_batches_processed: u64,
    failed: bool,
    complete: bool,
    cycles: u32,
    last_error: Option<String>,
}

impl RemoteNodeStatus {
    /// Creates a fresh status for a node.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Node ID.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Reported outcome.
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Batches sent (see [`BatchCountMode`]).
    pub fn batches_processed(&self) -> u64 {
        self.batches_processed
    }

    /// Change rows/events sent (see [`BatchCountMode`]).
    pub fn data_processed(&self) -> u64 {
        self.data_processed
    }

    /// Reload batches sent over the whole run.
    pub fn reload_batches_processed(&self) -> u64 {
        self.reload_batches_processed
    }

    /// Whether the node failed. Sticky for the run.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Whether the node's retry loop ran to completion.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Number of extract/transmit cycles run.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Message of the error that failed the node.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Applies the batches sent in one cycle.
    ///
    /// A batch counts as a reload batch when its `load_flag` is set or its
    /// channel is a reload channel. Status is derived from what was sent, not
    /// from acknowledgments.
    pub fn update_outgoing_status(
        &mut self,
        batches: &[OutgoingBatch],
        channels: &ChannelMap,
        mode: BatchCountMode,
    ) {
        if mode == BatchCountMode::PerCycle {
            self.batches_processed = 0;
            self.data_processed = 0;
        }

        for batch in batches {
            self.batches_processed += 1;
            self.data_processed += batch.data_event_count;

            let reload_channel = channels
                .get(&batch.channel_id)
                .is_some_and(|channel| channel.reload_flag);
            if batch.load_flag || reload_channel {
                self.reload_batches_processed += 1;
            }
        }

        self.cycles += 1;
        if !self.failed {
            self.status = if self.batches_processed > 0 {
                NodeStatus::DataProcessed
            } else {
                NodeStatus::NoData
            };
        }
    }

    /// Records a node-scoped failure for the current cycle.
    pub fn record_failure(&mut self, error: &PushError) {
        self.mark_failed(error);
        self.cycles += 1;
    }

    /// Fails a cycle whose batches were already applied.
    pub(crate) fn mark_failed(&mut self, error: &PushError) {
        self.failed = true;
        self.status = error.node_status();
        self.last_error = Some(error.to_string());
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }
}

/// Statuses for every node touched by one push run.
///
/// The registry is seeded with the channel map before any node is processed,
/// so it can be returned even when no node is contacted. Entries keep the
/// order in which nodes were first added.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteNodeStatuses {
    channels: ChannelMap,
    statuses: Vec<RemoteNodeStatus>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl RemoteNodeStatuses {
    /// Creates an empty registry seeded with the given channels.
    pub fn new(channels: ChannelMap) -> Self {
        Self {
            channels,
            statuses: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the status for `node_id`, creating it if needed.
    pub fn add(&mut self, node_id: &str) -> &mut RemoteNodeStatus {
        let slot = match self.index.get(node_id) {
            Some(&slot) => slot,
            None => {
                self.statuses.push(RemoteNodeStatus::new(node_id));
                let slot = self.statuses.len() - 1;
                self.index.insert(node_id.to_string(), slot);
                slot
            }
        };
        &mut self.statuses[slot]
    }

    /// Replaces the stored status with the same node ID, inserting it if absent.
    pub fn put(&mut self, status: RemoteNodeStatus) {
        let node_id = status.node_id.clone();
        *self.add(&node_id) = status;
    }

    /// Returns the status for `node_id`.
    pub fn get(&self, node_id: &str) -> Option<&RemoteNodeStatus> {
        self.index.get(node_id).map(|&slot| &self.statuses[slot])
    }

    /// Returns the status for `node_id` mutably.
    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut RemoteNodeStatus> {
        match self.index.get(node_id) {
            Some(&slot) => Some(&mut self.statuses[slot]),
            None => None,
        }
    }

    /// Channels the registry was seeded with.
    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }

    /// Number of node statuses.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Keeps only the statuses matching `keep`, preserving order.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&RemoteNodeStatus) -> bool) {
        self.statuses.retain(|status| keep(status));
        self.index = self
            .statuses
            .iter()
            .enumerate()
            .map(|(slot, status)| (status.node_id.clone(), slot))
            .collect();
    }

    /// Returns true if no node status was added.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Iterates statuses in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteNodeStatus> {
        self.statuses.iter()
    }

    /// Returns true if any node sent change rows.
    pub fn was_data_processed(&self) -> bool {
        self.statuses.iter().any(|s| s.data_processed > 0)
    }

    /// Returns true if any node sent batches.
    pub fn was_batch_processed(&self) -> bool {
        self.statuses.iter().any(|s| s.batches_processed > 0)
    }

    /// Total change rows sent.
    pub fn data_processed_count(&self) -> u64 {
        self.statuses.iter().map(|s| s.data_processed).sum()
    }

    /// Total batches sent.
    pub fn batches_processed_count(&self) -> u64 {
        self.statuses.iter().map(|s| s.batches_processed).sum()
    }

    /// Returns true if any node failed.
    pub fn error_occurred(&self) -> bool {
        self.statuses.iter().any(|s| s.failed)
    }

    /// Returns true if every node finished its retry loop.
    pub fn is_complete(&self) -> bool {
        self.statuses.iter().all(|s| s.complete)
    }
}

impl<'a> IntoIterator for &'a RemoteNodeStatuses {
    type Item = &'a RemoteNodeStatus;
    type IntoIter = std::slice::Iter<'a, RemoteNodeStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.statuses.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushsync_model::Channel;

    fn channels() -> ChannelMap {
        let mut channels = ChannelMap::new();
        channels.insert("default".into(), Channel::new("default"));
        channels.insert("reload".into(), Channel::reload("reload"));
        channels
    }

    fn batch(id: u64, channel: &str, rows: u64) -> OutgoingBatch {
        OutgoingBatch::new(id, "00002", channel, rows)
    }

    #[test]
    fn update_counts_batches_and_rows() {
        let mut status = RemoteNodeStatus::new("00002");
        status.update_outgoing_status(
            &[batch(1, "default", 3), batch(2, "default", 4)],
            &channels(),
            BatchCountMode::Cumulative,
        );

        assert_eq!(status.batches_processed(), 2);
        assert_eq!(status.data_processed(), 7);
        assert_eq!(status.reload_batches_processed(), 0);
        assert_eq!(status.status(), NodeStatus::DataProcessed);
        assert_eq!(status.cycles(), 1);
    }

    #[test]
    fn reload_channel_and_load_flag_count_as_reload() {
        let mut status = RemoteNodeStatus::new("00002");
        status.update_outgoing_status(
            &[
                batch(1, "reload", 1),
                batch(2, "default", 1).with_load_flag(true),
                batch(3, "default", 1),
            ],
            &channels(),
            BatchCountMode::Cumulative,
        );
        assert_eq!(status.reload_batches_processed(), 2);
    }

    #[test]
    fn unknown_channel_is_not_reload() {
        let mut status = RemoteNodeStatus::new("00002");
        status.update_outgoing_status(
            &[batch(1, "missing", 1)],
            &channels(),
            BatchCountMode::Cumulative,
        );
        assert_eq!(status.reload_batches_processed(), 0);
    }

    #[test]
    fn per_cycle_mode_resets_counters() {
        let mut status = RemoteNodeStatus::new("00002");
        let channels = channels();
        status.update_outgoing_status(
            &[batch(1, "reload", 5), batch(2, "default", 5)],
            &channels,
            BatchCountMode::PerCycle,
        );
        status.update_outgoing_status(&[batch(3, "default", 2)], &channels, BatchCountMode::PerCycle);

        assert_eq!(status.batches_processed(), 1);
        assert_eq!(status.data_processed(), 2);
        // reload count stays cumulative
        assert_eq!(status.reload_batches_processed(), 1);
        assert_eq!(status.cycles(), 2);
    }

    #[test]
    fn empty_cycle_reports_no_data() {
        let mut status = RemoteNodeStatus::new("00002");
        status.update_outgoing_status(&[], &channels(), BatchCountMode::Cumulative);
        assert_eq!(status.status(), NodeStatus::NoData);
        assert_eq!(status.cycles(), 1);
    }

    #[test]
    fn failure_is_sticky() {
        let mut status = RemoteNodeStatus::new("00002");
        status.record_failure(&PushError::transport_unavailable("00002", "refused"));
        status.update_outgoing_status(&[batch(1, "default", 1)], &channels(), BatchCountMode::Cumulative);

        assert!(status.failed());
        assert_eq!(status.status(), NodeStatus::Offline);
        assert!(status.last_error().unwrap().contains("refused"));
    }

    #[test]
    fn registry_add_reuses_entry() {
        let mut statuses = RemoteNodeStatuses::new(channels());
        statuses.add("00002").update_outgoing_status(
            &[batch(1, "default", 1)],
            &ChannelMap::new(),
            BatchCountMode::Cumulative,
        );
        let again = statuses.add("00002");
        assert_eq!(again.batches_processed(), 1);
        assert_eq!(statuses.len(), 1);
    }

    #[test]
    fn registry_keeps_insertion_order() {
        let mut statuses = RemoteNodeStatuses::default();
        statuses.add("b");
        statuses.add("a");
        statuses.add("b");
        let ids: Vec<_> = statuses.iter().map(|s| s.node_id()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn registry_put_replaces() {
        let mut statuses = RemoteNodeStatuses::default();
        statuses.add("a");
        let mut replacement = RemoteNodeStatus::new("a");
        replacement.mark_complete();
        statuses.put(replacement);

        assert_eq!(statuses.len(), 1);
        assert!(statuses.get("a").unwrap().complete());
    }

    #[test]
    fn registry_retain_rebuilds_index() {
        let mut statuses = RemoteNodeStatuses::default();
        statuses.add("a");
        statuses.add("b");
        statuses.add("c");
        statuses.retain(|s| s.node_id() != "a");

        let ids: Vec<_> = statuses.iter().map(|s| s.node_id()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert!(statuses.get("a").is_none());
        assert_eq!(statuses.get("c").unwrap().node_id(), "c");
        statuses.add("c");
        assert_eq!(statuses.len(), 2);
    }

    #[test]
    fn failure_after_sent_batches_keeps_counts() {
        let mut status = RemoteNodeStatus::new("00002");
        status.update_outgoing_status(
            &[batch(1, "default", 3)],
            &channels(),
            BatchCountMode::Cumulative,
        );
        status.mark_failed(&PushError::transport_unavailable("00002", "ack lost"));

        assert!(status.failed());
        assert_eq!(status.status(), NodeStatus::Offline);
        assert_eq!(status.batches_processed(), 1);
        assert_eq!(status.data_processed(), 3);
        assert_eq!(status.cycles(), 1);
    }

    #[test]
    fn registry_aggregates() {
        let channels = channels();
        let mut statuses = RemoteNodeStatuses::new(channels.clone());
        assert!(statuses.is_empty());
        assert!(statuses.is_complete());
        assert!(!statuses.error_occurred());

        let ok = statuses.add("a");
        ok.update_outgoing_status(&[batch(1, "default", 4)], &channels, BatchCountMode::Cumulative);
        ok.mark_complete();

        let bad = statuses.add("b");
        bad.record_failure(&PushError::extraction_failure("b", "boom"));

        assert!(statuses.was_data_processed());
        assert!(statuses.was_batch_processed());
        assert_eq!(statuses.data_processed_count(), 4);
        assert_eq!(statuses.batches_processed_count(), 1);
        assert!(statuses.error_occurred());
        assert!(!statuses.is_complete());
        assert_eq!(statuses.channels().len(), 2);
    }
}
