//! Transport layer abstraction for push sessions.

use crate::cancel::CallOptions;
use crate::error::{PushError, PushResult};
use parking_lot::Mutex;
use pushsync_model::{Node, OutgoingBatch};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// An open outbound channel to one remote node.
///
/// This trait abstracts the wire layer (HTTP, file drop, socket, mock for
/// testing, etc.).
pub trait OutgoingTransport: Send {
    /// Writes one extracted batch to the remote node.
    fn write(&mut self, batch: &OutgoingBatch) -> PushResult<()>;

    /// Checks if the transport is still open.
    fn is_open(&self) -> bool;

    /// Closes the transport.
    fn close(&mut self) -> PushResult<()>;
}

/// Opens push transports.
pub trait TransportManager: Send + Sync {
    /// Opens a push transport from `identity` to `remote`.
    ///
    /// Fails with [`PushError::TransportUnavailable`] when the remote cannot
    /// be reached or rejects the credentials.
    fn push_transport(
        &self,
        remote: &Node,
        identity: &Node,
        password: &str,
        registration_url: &str,
        options: &CallOptions,
    ) -> PushResult<Box<dyn OutgoingTransport>>;
}

/// Owns an open transport for one cycle and closes it when dropped.
pub struct TransportSession {
    node_id: String,
    transport: Box<dyn OutgoingTransport>,
}

impl TransportSession {
    /// Wraps an open transport to `node_id`.
    pub fn new(node_id: impl Into<String>, transport: Box<dyn OutgoingTransport>) -> Self {
        Self {
            node_id: node_id.into(),
            transport,
        }
    }

    /// Remote node ID.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The underlying transport.
    pub fn transport_mut(&mut self) -> &mut dyn OutgoingTransport {
        self.transport.as_mut()
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if self.transport.is_open() {
            if let Err(e) = self.transport.close() {
                warn!(node_id = %self.node_id, error = %e, "failed to close push transport");
            }
        }
    }
}

#[derive(Debug, Default)]
struct SessionLedger {
    opened: HashMap<String, u32>,
    closed: HashMap<String, u32>,
    written: HashMap<String, Vec<OutgoingBatch>>,
    last_password: Option<String>,
    last_registration_url: Option<String>,
}

/// A transport manager for testing that records every session it hands out.
#[derive(Debug, Default)]
pub struct MockTransportManager {
    ledger: Arc<Mutex<SessionLedger>>,
    unreachable: Mutex<HashSet<String>>,
    rejecting: Mutex<HashSet<String>>,
}

impl MockTransportManager {
    /// Creates a new mock transport manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every open to `node_id` fail as unreachable.
    pub fn set_unreachable(&self, node_id: impl Into<String>) {
        self.unreachable.lock().insert(node_id.into());
    }

    /// Makes every open to `node_id` fail with rejected credentials.
    pub fn set_rejecting(&self, node_id: impl Into<String>) {
        self.rejecting.lock().insert(node_id.into());
    }

    /// Number of sessions opened to `node_id`.
    pub fn opened(&self, node_id: &str) -> u32 {
        self.ledger.lock().opened.get(node_id).copied().unwrap_or(0)
    }

    /// Number of sessions to `node_id` that were closed.
    pub fn closed(&self, node_id: &str) -> u32 {
        self.ledger.lock().closed.get(node_id).copied().unwrap_or(0)
    }

    /// Total sessions opened.
    pub fn total_opened(&self) -> u32 {
        self.ledger.lock().opened.values().sum()
    }

    /// Total sessions closed.
    pub fn total_closed(&self) -> u32 {
        self.ledger.lock().closed.values().sum()
    }

    /// Batches written to `node_id`, in write order.
    pub fn written(&self, node_id: &str) -> Vec<OutgoingBatch> {
        self.ledger
            .lock()
            .written
            .get(node_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Password passed to the most recent open.
    pub fn last_password(&self) -> Option<String> {
        self.ledger.lock().last_password.clone()
    }

    /// Registration URL passed to the most recent open.
    pub fn last_registration_url(&self) -> Option<String> {
        self.ledger.lock().last_registration_url.clone()
    }
}

impl TransportManager for MockTransportManager {
    fn push_transport(
        &self,
        remote: &Node,
        _identity: &Node,
        password: &str,
        registration_url: &str,
        options: &CallOptions,
    ) -> PushResult<Box<dyn OutgoingTransport>> {
        options.check_deadline(&remote.node_id)?;

        if self.unreachable.lock().contains(&remote.node_id) {
            return Err(PushError::transport_unavailable(
                &remote.node_id,
                "connection refused",
            ));
        }
        if self.rejecting.lock().contains(&remote.node_id) {
            return Err(PushError::auth_rejected(&remote.node_id, "credentials rejected"));
        }

        let mut ledger = self.ledger.lock();
        *ledger.opened.entry(remote.node_id.clone()).or_insert(0) += 1;
        ledger.last_password = Some(password.to_string());
        ledger.last_registration_url = Some(registration_url.to_string());

        Ok(Box::new(MockTransport {
            node_id: remote.node_id.clone(),
            ledger: Arc::clone(&self.ledger),
            open: true,
        }))
    }
}

/// A transport handed out by [`MockTransportManager`].
#[derive(Debug)]
pub struct MockTransport {
    node_id: String,
    ledger: Arc<Mutex<SessionLedger>>,
    open: bool,
}

impl OutgoingTransport for MockTransport {
    fn write(&mut self, batch: &OutgoingBatch) -> PushResult<()> {
        if !self.open {
            return Err(PushError::transport_unavailable(
                &self.node_id,
                "transport closed",
            ));
        }
        self.ledger
            .lock()
            .written
            .entry(self.node_id.clone())
            .or_default()
            .push(batch.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> PushResult<()> {
        if self.open {
            self.open = false;
            *self
                .ledger
                .lock()
                .closed
                .entry(self.node_id.clone())
                .or_insert(0) += 1;
        }
        Ok(())
    }
}
