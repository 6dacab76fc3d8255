//! # pushsync engine
//!
//! The outbound half of node-to-node change synchronization.
//!
//! This crate provides:
//! - `PushService`, which pushes pending batches to every eligible remote node
//! - The retry-until-stable loop driven by reload batches
//! - Per-node status counters and the registry returned to callers
//! - Collaborator traits (node directory, channels, transport, extractor)
//! - In-memory collaborators for tests and dry runs
//!
//! ## Architecture
//!
//! A push run works node by node:
//! 1. Resolve the local identity and the nodes to push to
//! 2. Open a transport session and extract pending batches for the node
//! 3. Repeat while the previous cycle sent new reload batches
//!
//! ## Key Invariants
//!
//! - A node's `failed` flag is never cleared within a run
//! - `reload_batches_processed` never decreases within a run
//! - The registry holds at most one status per node ID
//! - Every transport session opened is closed before its cycle returns

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code must not panic; tests may unwrap.
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod ack;
mod cancel;
mod config;
mod directory;
mod error;
mod extract;
mod push;
mod status;
mod transport;

pub use ack::{AckReader, NoAckReader};
pub use cancel::{CallOptions, CancelToken};
pub use config::{BatchCountMode, PushConfig};
pub use directory::{ConfigurationService, MemoryConfiguration, MemoryNodeDirectory, NodeDirectory};
pub use error::{PushError, PushResult};
pub use extract::{BatchExtractor, CycleScript, ScriptedExtractor};
pub use push::PushService;
pub use status::{NodeStatus, RemoteNodeStatus, RemoteNodeStatuses};
pub use transport::{
    MockTransport, MockTransportManager, OutgoingTransport, TransportManager, TransportSession,
};
