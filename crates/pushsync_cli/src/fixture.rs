//! Topology fixtures for dry runs.
//!
//! A fixture describes the local node, its push targets, the channels and
//! what the extractor returns for each target, cycle by cycle.

use pushsync_engine::{
    CycleScript, MemoryConfiguration, MemoryNodeDirectory, MockTransportManager, PushConfig,
    PushService, ScriptedExtractor,
};
use pushsync_model::{Channel, Node, NodeSecurity};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading a fixture.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// The fixture file could not be read.
    #[error("cannot read fixture {path:?}: {source}")]
    Io {
        /// Fixture path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The fixture is not valid JSON for this format.
    #[error("invalid fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A push topology.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Local node.
    pub identity: Option<Node>,
    /// Security rows.
    pub security: Vec<NodeSecurity>,
    /// Push targets, in push order.
    pub nodes: Vec<Node>,
    /// Configured channels.
    pub channels: Vec<Channel>,
    /// Extraction outcomes per target node ID.
    pub cycles: BTreeMap<String, Vec<CycleScript>>,
    /// Targets whose transport cannot be opened.
    pub unreachable: Vec<String>,
    /// Targets that reject our credentials.
    pub rejecting: Vec<String>,
    /// Registration URL passed to the transport.
    pub registration_url: String,
}

impl Fixture {
    /// Loads a fixture from a JSON file.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses a fixture from JSON text.
    pub fn parse(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Problems that make the fixture unlikely to do what its author meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match &self.identity {
            None => warnings.push("no identity: the run will be a no-op".to_string()),
            Some(identity) => {
                if !identity.sync_enabled {
                    warnings.push(format!("sync is disabled for {}", identity.node_id));
                }
                if !self.security.iter().any(|s| s.node_id == identity.node_id) {
                    warnings.push(format!("no security row for {}", identity.node_id));
                }
            }
        }
        for node_id in self.cycles.keys() {
            if !self.nodes.iter().any(|n| &n.node_id == node_id) {
                warnings.push(format!("cycles scripted for unknown node {node_id}"));
            }
        }
        warnings
    }

    /// Builds a push service over in-memory collaborators.
    pub fn service(&self, config: PushConfig) -> PushService {
        let directory = Arc::new(MemoryNodeDirectory::new());
        if let Some(identity) = &self.identity {
            directory.set_identity(identity.clone());
        }
        for security in &self.security {
            directory.add_security(security.clone());
        }
        for node in &self.nodes {
            directory.add_push_target(node.clone());
        }

        let configuration = Arc::new(MemoryConfiguration::with_channels(
            self.channels.iter().cloned(),
        ));

        let transports = Arc::new(MockTransportManager::new());
        for node_id in &self.unreachable {
            transports.set_unreachable(node_id.clone());
        }
        for node_id in &self.rejecting {
            transports.set_rejecting(node_id.clone());
        }

        let extractor = Arc::new(ScriptedExtractor::new());
        for (node_id, scripts) in &self.cycles {
            for script in scripts {
                extractor.push_script(node_id.clone(), script.clone());
            }
        }

        let config = if config.registration_url.is_empty() {
            PushConfig {
                registration_url: self.registration_url.clone(),
                ..config
            }
        } else {
            config
        };

        PushService::new(config, directory, configuration, transports, extractor)
    }
}
