//! Delivery acknowledgment hook.
//!
//! Status counters are derived from the batches that were sent, not from the
//! remote's confirmation of receipt. An `AckReader` is called after every
//! successful extraction so a transport that can report acknowledgments has a
//! place to consume them; the default reader ignores them.

use crate::error::PushResult;
use crate::transport::OutgoingTransport;
use pushsync_model::{Node, OutgoingBatch};

/// Reads acknowledgments for the batches sent in one cycle.
pub trait AckReader: Send + Sync {
    /// Consumes acknowledgments for `batches` from `transport`.
    fn read_acks(
        &self,
        remote: &Node,
        batches: &[OutgoingBatch],
        transport: &mut dyn OutgoingTransport,
    ) -> PushResult<()>;
}

/// The default reader: acknowledgments are not read.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAckReader;

impl AckReader for NoAckReader {
    fn read_acks(
        &self,
        _remote: &Node,
        _batches: &[OutgoingBatch],
        _transport: &mut dyn OutgoingTransport,
    ) -> PushResult<()> {
        Ok(())
    }
}
