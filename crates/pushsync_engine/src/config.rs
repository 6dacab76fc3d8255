//! Configuration for the push orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How `batches_processed` and `data_processed` evolve across the cycles of
/// one node's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCountMode {
    /// Counters accumulate over every cycle of the run.
    #[default]
    Cumulative,
    /// Counters hold the most recent cycle only.
    PerCycle,
}

/// Configuration for push runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Registration URL handed to the transport manager.
    pub registration_url: String,
    /// Deadline for each blocking collaborator call.
    pub timeout: Duration,
    /// Number of nodes processed at the same time.
    pub max_concurrent_nodes: usize,
    /// Counter semantics across retry cycles.
    pub batch_count_mode: BatchCountMode,
    /// Whether to ask the configuration service for fresh channels.
    pub refresh_channels: bool,
}

impl PushConfig {
    /// Creates a new push configuration.
    pub fn new(registration_url: impl Into<String>) -> Self {
        Self {
            registration_url: registration_url.into(),
            timeout: Duration::from_secs(30),
            max_concurrent_nodes: 1,
            batch_count_mode: BatchCountMode::Cumulative,
            refresh_channels: false,
        }
    }

    /// Sets the call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of nodes processed concurrently (at least 1).
    pub fn with_max_concurrent_nodes(mut self, max: usize) -> Self {
        self.max_concurrent_nodes = max.max(1);
        self
    }

    /// Sets the batch counter semantics.
    pub fn with_batch_count_mode(mut self, mode: BatchCountMode) -> Self {
        self.batch_count_mode = mode;
        self
    }

    /// Sets whether channels are refreshed at the start of a run.
    pub fn with_refresh_channels(mut self, refresh: bool) -> Self {
        self.refresh_channels = refresh;
        self
    }

    /// Returns the effective worker count.
    pub fn workers(&self) -> usize {
        self.max_concurrent_nodes.max(1)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self::new("")
    }
}
