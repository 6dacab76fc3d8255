//! Run command implementation.

use crate::fixture::Fixture;
use clap::ValueEnum;
use pushsync_engine::{BatchCountMode, PushConfig, RemoteNodeStatuses};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Report format for `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Pretty-printed statuses
    Json,
}

/// Options for a dry run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Nodes pushed concurrently.
    pub workers: usize,
    /// Report per-cycle counts.
    pub per_cycle: bool,
    /// Call timeout in seconds.
    pub timeout_secs: u64,
    /// Registration URL override.
    pub registration_url: Option<String>,
}

impl RunOptions {
    fn config(&self) -> PushConfig {
        let mode = if self.per_cycle {
            BatchCountMode::PerCycle
        } else {
            BatchCountMode::Cumulative
        };
        PushConfig::new(self.registration_url.clone().unwrap_or_default())
            .with_max_concurrent_nodes(self.workers)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_batch_count_mode(mode)
    }
}

/// Pushes against the fixture at `path` and prints the statuses.
pub fn run(
    path: &Path,
    options: &RunOptions,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Running push against {:?}", path);

    let fixture = Fixture::load(path)?;
    let statuses = fixture.service(options.config()).push_data();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Text => print!("{}", render_text(&statuses)),
    }

    Ok(())
}

fn render_text(statuses: &RemoteNodeStatuses) -> String {
    let mut out = String::new();
    out.push_str("Push Run\n");
    out.push_str("========\n");
    out.push_str(&format!("  Channels: {}\n", statuses.channels().len()));
    out.push_str(&format!("  Nodes: {}\n", statuses.len()));
    out.push_str(&format!(
        "  Batches: {}\n",
        statuses.batches_processed_count()
    ));
    out.push_str(&format!("  Data: {}\n", statuses.data_processed_count()));
    out.push_str(&format!(
        "  Errors: {}\n",
        if statuses.error_occurred() { "yes" } else { "no" }
    ));

    if !statuses.is_empty() {
        out.push_str("\nNodes:\n");
        for status in statuses {
            out.push_str(&format!(
                "  {} [{:?}] cycles={} batches={} data={} reload={}{}\n",
                status.node_id(),
                status.status(),
                status.cycles(),
                status.batches_processed(),
                status.data_processed(),
                status.reload_batches_processed(),
                if status.complete() { "" } else { " (incomplete)" },
            ));
            if let Some(error) = status.last_error() {
                out.push_str(&format!("      error: {}\n", error));
            }
        }
    }
    out
}
