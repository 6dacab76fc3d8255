//! Cancellation and per-call options.

use crate::error::{PushError, PushResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A shared cancellation flag.
///
/// Clones observe the same flag, so a token handed to another thread (or to a
/// collaborator) can stop a running push between cycles.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(PushError::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> PushResult<()> {
        if self.is_cancelled() {
            Err(PushError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Options passed to blocking collaborator calls.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Point in time after which the call should give up. `None` when the
    /// timeout is too large to be represented.
    pub deadline: Option<Instant>,
    /// Cancellation flag of the run.
    pub cancel: CancelToken,
}

impl CallOptions {
    /// Creates options expiring `timeout` from now.
    pub fn new(timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel,
        }
    }

    /// Time left before the deadline, or `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails with `Timeout` for `node_id` once the deadline has passed.
    pub fn check_deadline(&self, node_id: &str) -> PushResult<()> {
        if self.is_expired() {
            Err(PushError::Timeout {
                node_id: node_id.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
