//! Batch extraction collaborator.

use crate::cancel::CallOptions;
use crate::error::{PushError, PushResult};
use crate::transport::OutgoingTransport;
use parking_lot::Mutex;
use pushsync_model::{Node, OutgoingBatch};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Selects pending batches for a node and writes them to an open transport.
pub trait BatchExtractor: Send + Sync {
    /// Extracts and sends the pending batches for `remote`.
    ///
    /// Returns the batches that were written, possibly none. Fails with
    /// [`PushError::ExtractionFailure`] when batches cannot be produced.
    fn extract(
        &self,
        remote: &Node,
        transport: &mut dyn OutgoingTransport,
        options: &CallOptions,
    ) -> PushResult<Vec<OutgoingBatch>>;
}

/// The outcome of one scripted extraction cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleScript {
    /// Write these batches.
    Batches(Vec<OutgoingBatch>),
    /// Fail the extraction with this message.
    Error(String),
}

/// An extractor for testing that replays a queue of cycle outcomes per node.
///
/// Once a node's queue is drained every further call returns no batches.
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, VecDeque<CycleScript>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedExtractor {
    /// Creates an extractor with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a cycle outcome for `node_id`.
    pub fn push_script(&self, node_id: impl Into<String>, script: CycleScript) {
        self.scripts
            .lock()
            .entry(node_id.into())
            .or_default()
            .push_back(script);
    }

    /// Queues a cycle that writes `batches` to `node_id`.
    pub fn push_cycle(&self, node_id: impl Into<String>, batches: Vec<OutgoingBatch>) {
        self.push_script(node_id, CycleScript::Batches(batches));
    }

    /// Queues a failing cycle for `node_id`.
    pub fn push_failure(&self, node_id: impl Into<String>, reason: impl Into<String>) {
        self.push_script(node_id, CycleScript::Error(reason.into()));
    }

    /// Number of `extract` calls made for `node_id`.
    pub fn calls(&self, node_id: &str) -> u32 {
        self.calls.lock().get(node_id).copied().unwrap_or(0)
    }

    /// Total `extract` calls.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

impl BatchExtractor for ScriptedExtractor {
    fn extract(
        &self,
        remote: &Node,
        transport: &mut dyn OutgoingTransport,
        options: &CallOptions,
    ) -> PushResult<Vec<OutgoingBatch>> {
        *self.calls.lock().entry(remote.node_id.clone()).or_insert(0) += 1;
        options.check_deadline(&remote.node_id)?;

        let next = self
            .scripts
            .lock()
            .get_mut(&remote.node_id)
            .and_then(|queue| queue.pop_front());

        match next {
            None => Ok(Vec::new()),
            Some(CycleScript::Error(reason)) => {
                Err(PushError::extraction_failure(&remote.node_id, reason))
            }
            Some(CycleScript::Batches(batches)) => {
                for batch in &batches {
                    transport.write(batch)?;
                }
                Ok(batches)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::transport::{MockTransportManager, TransportManager};
    use std::time::Duration;

    fn options() -> CallOptions {
        CallOptions::new(Duration::from_secs(30), CancelToken::new())
    }

    #[test]
    fn scripted_cycles_replay_in_order() {
        let manager = MockTransportManager::new();
        let extractor = ScriptedExtractor::new();
        let remote = Node::new("00002", "store", "s-1");
        let identity = Node::new("00001", "corp", "hq");

        extractor.push_cycle("00002", vec![OutgoingBatch::new(1, "00002", "default", 3)]);
        extractor.push_failure("00002", "disk full");

        let mut transport = manager
            .push_transport(&remote, &identity, "pw", "", &options())
            .unwrap();

        let first = extractor
            .extract(&remote, transport.as_mut(), &options())
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(manager.written("00002"), first);

        let second = extractor.extract(&remote, transport.as_mut(), &options());
        assert!(matches!(second, Err(PushError::ExtractionFailure { .. })));

        let third = extractor
            .extract(&remote, transport.as_mut(), &options())
            .unwrap();
        assert!(third.is_empty());
        assert_eq!(extractor.calls("00002"), 3);
        assert_eq!(extractor.total_calls(), 3);
    }

    #[test]
    fn cycle_script_fixture_shape() {
        let scripts: Vec<CycleScript> = serde_json::from_str(
            r#"[{"batches":[{"batch_id":1,"node_id":"2","channel_id":"default"}]},{"error":"boom"}]"#,
        )
        .unwrap();
        assert!(matches!(&scripts[0], CycleScript::Batches(b) if b.len() == 1));
        assert_eq!(scripts[1], CycleScript::Error("boom".into()));
    }
}
