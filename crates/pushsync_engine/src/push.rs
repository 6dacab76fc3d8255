//! The push orchestrator.

use crate::ack::{AckReader, NoAckReader};
use crate::cancel::{CallOptions, CancelToken};
use crate::config::PushConfig;
use crate::directory::{ConfigurationService, NodeDirectory};
use crate::error::{PushError, PushResult};
use crate::extract::BatchExtractor;
use crate::status::{RemoteNodeStatus, RemoteNodeStatuses};
use crate::transport::{TransportManager, TransportSession};
use parking_lot::Mutex;
use pushsync_model::{ChannelMap, Node, NodeSecurity, OutgoingBatch};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Pushes pending change batches to every eligible remote node.
///
/// Collaborators are supplied at construction, so tests can swap in the
/// in-memory doubles shipped with this crate.
pub struct PushService {
    config: PushConfig,
    directory: Arc<dyn NodeDirectory>,
    configuration: Arc<dyn ConfigurationService>,
    transports: Arc<dyn TransportManager>,
    extractor: Arc<dyn BatchExtractor>,
    ack_reader: Arc<dyn AckReader>,
    cancel: CancelToken,
}

impl fmt::Debug for PushService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushService")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl PushService {
    /// Creates a new push service.
    pub fn new(
        config: PushConfig,
        directory: Arc<dyn NodeDirectory>,
        configuration: Arc<dyn ConfigurationService>,
        transports: Arc<dyn TransportManager>,
        extractor: Arc<dyn BatchExtractor>,
    ) -> Self {
        Self {
            config,
            directory,
            configuration,
            transports,
            extractor,
            ack_reader: Arc::new(NoAckReader),
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the acknowledgment reader.
    pub fn with_ack_reader(mut self, ack_reader: Arc<dyn AckReader>) -> Self {
        self.ack_reader = ack_reader;
        self
    }

    /// Uses a caller-supplied cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Returns a handle that cancels this service's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels the current run between cycles.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clears a previous cancellation. Runs do not reset it themselves.
    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    /// Pushes to every eligible node and returns their statuses.
    ///
    /// Never fails: per-node `failed` flags and the log are the signal. A
    /// missing identity, disabled sync or an empty target list return the
    /// freshly seeded registry untouched.
    pub fn push_data(&self) -> RemoteNodeStatuses {
        let channels = self.configuration.channels(self.config.refresh_channels);
        let mut statuses = RemoteNodeStatuses::new(channels);

        let Some(identity) = self.directory.find_identity() else {
            debug!("{}, nothing to push", PushError::IdentityUnavailable);
            return statuses;
        };
        if !identity.sync_enabled {
            let reason = PushError::SyncDisabled {
                node_id: identity.node_id.clone(),
            };
            debug!("{reason}, skipping push");
            return statuses;
        }

        let nodes = self.directory.find_nodes_to_push_to();
        if nodes.is_empty() {
            return statuses;
        }

        if self
            .directory
            .find_node_security(&identity.node_id)
            .is_none()
        {
            error!(
                node_id = %identity.node_id,
                "Could not find a node security row for '{}'. A node needs a matching security row \
                 in both the local and remote nodes if it is going to authenticate to push data",
                identity.node_id
            );
            return statuses;
        }

        debug!(nodes = nodes.len(), "starting push run");
        let outcome = if self.config.workers() > 1 && nodes.len() > 1 {
            self.push_nodes_concurrently(&nodes, &mut statuses)
        } else {
            self.push_nodes(&nodes, &mut statuses)
        };

        match outcome {
            Ok(()) => {}
            Err(PushError::Cancelled) => info!("push run cancelled"),
            Err(e) => error!(error = %e, "push run aborted"),
        }
        statuses
    }

    /// Runs the retry loop for one node until no new reload batches appear.
    ///
    /// The loop stops as soon as the node fails; failures are not retried.
    /// Run-level errors (`IdentityUnavailable`, `SecurityMissing`,
    /// `Cancelled`) are returned and leave the status incomplete.
    pub fn execute(
        &self,
        node: &Node,
        status: &mut RemoteNodeStatus,
        channels: &ChannelMap,
    ) -> PushResult<()> {
        let span = info_span!(
            "push",
            node_group_id = %node.node_group_id,
            external_id = %node.external_id,
            node_id = %node.node_id
        );
        let _entered = span.enter();

        let mut last_batch_count = 0;
        loop {
            self.cancel.check()?;
            if last_batch_count > 0 {
                info!(
                    "Pushing to {} again because the last push contained reload batches",
                    node.label()
                );
            }

            let previous_reload_count = status.reload_batches_processed();
            debug!("push requested for {}", node.label());
            self.push_to_node(node, status, channels)?;

            if !status.failed()
                && status.batches_processed() > 0
                && status.batches_processed() != last_batch_count
            {
                info!(
                    "Pushed data to {}. {} data and {} batches were processed",
                    node.label(),
                    status.data_processed(),
                    status.batches_processed()
                );
            } else if status.failed() {
                warn!(
                    "There was a failure while pushing data to {}. {} data and {} batches were processed",
                    node.label(),
                    status.data_processed(),
                    status.batches_processed()
                );
            }
            debug!("push completed for {}", node.label());
            last_batch_count = status.batches_processed();

            if status.failed() || status.reload_batches_processed() <= previous_reload_count {
                break;
            }
        }

        status.mark_complete();
        Ok(())
    }

    /// Runs exactly one extract/transmit cycle against `remote`.
    ///
    /// Transport, extraction and timeout failures mark `status` failed and
    /// return `Ok`. A missing local identity or security row is returned as an
    /// error because it fails every node, not just this one.
    pub fn push_to_node(
        &self,
        remote: &Node,
        status: &mut RemoteNodeStatus,
        channels: &ChannelMap,
    ) -> PushResult<()> {
        let identity = self
            .directory
            .find_identity()
            .ok_or(PushError::IdentityUnavailable)?;
        let security = self
            .directory
            .find_node_security(&identity.node_id)
            .ok_or_else(|| PushError::SecurityMissing {
                node_id: identity.node_id.clone(),
            })?;

        match self.transmit(remote, &identity, &security) {
            Ok((batches, acks)) => {
                status.update_outgoing_status(&batches, channels, self.config.batch_count_mode);
                match acks {
                    Err(e) if e.is_node_scoped() => {
                        status.mark_failed(&e);
                        Ok(())
                    }
                    other => other,
                }
            }
            Err(e) if e.is_node_scoped() => {
                status.record_failure(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Opens a session, extracts and sends. The session is closed when this
    /// returns, on every path.
    ///
    /// Batches are returned alongside the acknowledgment outcome since they
    /// were written before acknowledgments are read.
    fn transmit(
        &self,
        remote: &Node,
        identity: &Node,
        security: &NodeSecurity,
    ) -> PushResult<(Vec<OutgoingBatch>, PushResult<()>)> {
        let options = CallOptions::new(self.config.timeout, self.cancel.clone());
        let transport = self.transports.push_transport(
            remote,
            identity,
            &security.node_password,
            &self.config.registration_url,
            &options,
        )?;
        let mut session = TransportSession::new(&remote.node_id, transport);

        let batches = self
            .extractor
            .extract(remote, session.transport_mut(), &options)?;
        if !batches.is_empty() {
            info!("Push data sent to {}", remote.label());
        }

        // Acknowledgments do not feed the status yet.
        let acks = self
            .ack_reader
            .read_acks(remote, &batches, session.transport_mut());

        Ok((batches, acks))
    }

    fn push_nodes(&self, nodes: &[Node], statuses: &mut RemoteNodeStatuses) -> PushResult<()> {
        let channels = statuses.channels().clone();
        for node in nodes {
            self.cancel.check()?;
            let status = statuses.add(&node.node_id);
            if status.failed() {
                debug!("{} already failed in this run, skipping", node.label());
                continue;
            }
            self.execute(node, status, &channels)?;
        }
        Ok(())
    }

    /// Processes distinct node IDs on a bounded pool of scoped threads.
    ///
    /// Every reference to the same node ID is handled by one worker, in list
    /// order, so each node's retry loop stays single-threaded. Entries are
    /// reserved in list order and those no worker started are dropped, so the
    /// registry matches a sequential run even when the run stops early.
    fn push_nodes_concurrently(
        &self,
        nodes: &[Node],
        statuses: &mut RemoteNodeStatuses,
    ) -> PushResult<()> {
        let groups = group_by_node_id(nodes);
        for group in &groups {
            statuses.add(&group[0].node_id);
        }
        let started: Mutex<HashSet<String>> = Mutex::new(HashSet::new());

        let channels = statuses.channels().clone();
        let workers = self.config.workers().min(groups.len());
        let queue = Mutex::new(groups.into_iter().collect::<VecDeque<_>>());
        let shared = Mutex::new(std::mem::take(statuses));
        let first_error: Mutex<Option<PushError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if first_error.lock().is_some() {
                        break;
                    }
                    let next = queue.lock().pop_front();
                    let Some(group) = next else {
                        break;
                    };

                    let node_id = &group[0].node_id;
                    if let Err(e) = self.cancel.check() {
                        first_error.lock().get_or_insert(e);
                        break;
                    }
                    started.lock().insert(node_id.clone());

                    let mut status = shared.lock().add(node_id).clone();
                    let mut outcome = Ok(());
                    for (position, node) in group.iter().enumerate() {
                        if position > 0 {
                            outcome = self.cancel.check();
                            if outcome.is_err() {
                                break;
                            }
                        }
                        if status.failed() {
                            debug!("{} already failed in this run, skipping", node.label());
                            continue;
                        }
                        outcome = self.execute(node, &mut status, &channels);
                        if outcome.is_err() {
                            break;
                        }
                    }
                    shared.lock().put(status);

                    if let Err(e) = outcome {
                        first_error.lock().get_or_insert(e);
                        break;
                    }
                });
            }
        });

        *statuses = shared.into_inner();
        let started = started.into_inner();
        statuses.retain(|status| started.contains(status.node_id()));
        match first_error.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Groups nodes by ID, keeping first-occurrence order.
fn group_by_node_id(nodes: &[Node]) -> Vec<Vec<&Node>> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&Node>> = Vec::new();
    for node in nodes {
        match slots.get(node.node_id.as_str()) {
            Some(&slot) => groups[slot].push(node),
            None => {
                slots.insert(&node.node_id, groups.len());
                groups.push(vec![node]);
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchCountMode;
    use crate::directory::{MemoryConfiguration, MemoryNodeDirectory};
    use crate::extract::ScriptedExtractor;
    use crate::status::NodeStatus;
    use crate::transport::MockTransportManager;
    use pushsync_model::{Channel, NodeSecurity};

    struct Fixture {
        directory: Arc<MemoryNodeDirectory>,
        transports: Arc<MockTransportManager>,
        extractor: Arc<ScriptedExtractor>,
        service: PushService,
    }

    fn fixture(config: PushConfig) -> Fixture {
        let directory = Arc::new(MemoryNodeDirectory::new());
        directory.set_identity(Node::new("00000", "corp", "hq"));
        directory.add_security(NodeSecurity::new("00000", "secret"));

        let configuration = Arc::new(MemoryConfiguration::with_channels([
            Channel::new("default"),
            Channel::reload("reload"),
        ]));
        let transports = Arc::new(MockTransportManager::new());
        let extractor = Arc::new(ScriptedExtractor::new());

        let service = PushService::new(
            config,
            directory.clone(),
            configuration,
            transports.clone(),
            extractor.clone(),
        );
        Fixture {
            directory,
            transports,
            extractor,
            service,
        }
    }

    fn store(id: &str) -> Node {
        Node::new(id, "store", format!("s-{id}"))
    }

    fn batches(node_id: &str, reload: usize, plain: usize) -> Vec<OutgoingBatch> {
        (0..reload + plain)
            .map(|i| OutgoingBatch::new(i as u64, node_id, "default", 2).with_load_flag(i < reload))
            .collect()
    }

    #[test]
    fn push_to_node_updates_status_from_sent_batches() {
        let f = fixture(PushConfig::new("http://hq/sync"));
        f.extractor.push_cycle("00001", batches("00001", 1, 2));

        let mut status = RemoteNodeStatus::new("00001");
        let channels = f.service.configuration.channels(false);
        f.service
            .push_to_node(&store("00001"), &mut status, &channels)
            .unwrap();

        assert_eq!(status.batches_processed(), 3);
        assert_eq!(status.data_processed(), 6);
        assert_eq!(status.reload_batches_processed(), 1);
        assert_eq!(status.status(), NodeStatus::DataProcessed);
        assert_eq!(f.transports.opened("00001"), 1);
        assert_eq!(f.transports.closed("00001"), 1);
        assert_eq!(f.transports.last_password().as_deref(), Some("secret"));
        assert_eq!(
            f.transports.last_registration_url().as_deref(),
            Some("http://hq/sync")
        );
    }

    #[test]
    fn push_to_node_without_identity_is_run_level() {
        let f = fixture(PushConfig::default());
        f.directory.clear_identity();

        let mut status = RemoteNodeStatus::new("00001");
        let result = f
            .service
            .push_to_node(&store("00001"), &mut status, &ChannelMap::new());

        assert_eq!(result, Err(PushError::IdentityUnavailable));
        assert!(!status.failed());
        assert_eq!(f.transports.total_opened(), 0);
    }

    #[test]
    fn extraction_failure_marks_node_and_closes_session() {
        let f = fixture(PushConfig::default());
        f.extractor.push_failure("00001", "corrupt row");

        let mut status = RemoteNodeStatus::new("00001");
        f.service
            .push_to_node(&store("00001"), &mut status, &ChannelMap::new())
            .unwrap();

        assert!(status.failed());
        assert_eq!(status.status(), NodeStatus::UnknownError);
        assert_eq!(f.transports.opened("00001"), 1);
        assert_eq!(f.transports.closed("00001"), 1);
    }

    #[test]
    fn execute_loops_while_reload_batches_appear() {
        let f = fixture(PushConfig::default());
        f.extractor.push_cycle("00001", batches("00001", 2, 0));
        f.extractor.push_cycle("00001", batches("00001", 1, 1));
        f.extractor.push_cycle("00001", batches("00001", 0, 1));

        let mut status = RemoteNodeStatus::new("00001");
        f.service
            .execute(&store("00001"), &mut status, &ChannelMap::new())
            .unwrap();

        assert_eq!(status.cycles(), 3);
        assert_eq!(f.extractor.calls("00001"), 3);
        assert_eq!(status.reload_batches_processed(), 3);
        assert_eq!(status.batches_processed(), 5);
        assert!(status.complete());
    }

    #[test]
    fn execute_single_cycle_without_reload() {
        let f = fixture(PushConfig::default());
        f.extractor.push_cycle("00001", batches("00001", 0, 4));

        let mut status = RemoteNodeStatus::new("00001");
        f.service
            .execute(&store("00001"), &mut status, &ChannelMap::new())
            .unwrap();
        assert_eq!(status.cycles(), 1);
    }

    #[test]
    fn execute_stops_when_cancelled() {
        let f = fixture(PushConfig::default());
        f.service.cancel();

        let mut status = RemoteNodeStatus::new("00001");
        let result = f
            .service
            .execute(&store("00001"), &mut status, &ChannelMap::new());
        assert_eq!(result, Err(PushError::Cancelled));
        assert_eq!(status.cycles(), 0);
        assert!(!status.complete());

        f.service.reset_cancel();
        assert!(f
            .service
            .execute(&store("00001"), &mut status, &ChannelMap::new())
            .is_ok());
    }

    #[test]
    fn per_cycle_mode_reports_last_cycle() {
        let f = fixture(PushConfig::default().with_batch_count_mode(BatchCountMode::PerCycle));
        f.extractor.push_cycle("00001", batches("00001", 1, 2));
        f.extractor.push_cycle("00001", batches("00001", 0, 1));

        let mut status = RemoteNodeStatus::new("00001");
        f.service
            .execute(&store("00001"), &mut status, &ChannelMap::new())
            .unwrap();

        assert_eq!(status.cycles(), 2);
        assert_eq!(status.batches_processed(), 1);
        assert_eq!(status.reload_batches_processed(), 1);
    }

    struct CountingAcks(Mutex<Vec<usize>>);

    impl AckReader for CountingAcks {
        fn read_acks(
            &self,
            remote: &Node,
            batches: &[OutgoingBatch],
            transport: &mut dyn crate::transport::OutgoingTransport,
        ) -> PushResult<()> {
            assert!(transport.is_open());
            if remote.node_id == "00009" {
                return Err(PushError::transport_unavailable("00009", "ack stream lost"));
            }
            self.0.lock().push(batches.len());
            Ok(())
        }
    }

    #[test]
    fn ack_reader_sees_each_cycle_with_open_session() {
        let acks = Arc::new(CountingAcks(Mutex::new(Vec::new())));
        let f = fixture(PushConfig::default());
        let service = f.service.with_ack_reader(acks.clone());
        f.extractor.push_cycle("00001", batches("00001", 1, 1));
        f.extractor.push_cycle("00009", batches("00009", 0, 1));

        let mut status = RemoteNodeStatus::new("00001");
        service
            .execute(&store("00001"), &mut status, &ChannelMap::new())
            .unwrap();
        assert_eq!(*acks.0.lock(), [2, 0]);

        let mut failing = RemoteNodeStatus::new("00009");
        service
            .execute(&store("00009"), &mut failing, &ChannelMap::new())
            .unwrap();
        assert!(failing.failed());
        assert_eq!(failing.status(), NodeStatus::Offline);
        assert_eq!(failing.batches_processed(), 1);
        assert_eq!(failing.data_processed(), 2);
        assert_eq!(failing.cycles(), 1);
        assert!(failing.last_error().unwrap().contains("ack stream lost"));
        assert_eq!(f.transports.opened("00009"), f.transports.closed("00009"));
    }

    #[test]
    fn grouping_keeps_first_occurrence_order() {
        let nodes = vec![store("b"), store("a"), store("b"), store("c")];
        let groups = group_by_node_id(&nodes);
        let ids: Vec<_> = groups
            .iter()
            .map(|g| (g[0].node_id.as_str(), g.len()))
            .collect();
        assert_eq!(ids, [("b", 2), ("a", 1), ("c", 1)]);
    }
}
