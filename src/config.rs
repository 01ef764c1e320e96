//! `node.toml` configuration for gossipd.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Address this node binds to and advertises to its peers.
    #[serde(default = "NodeConfig::default_bind")]
    pub bind: String,
    /// Seed node addresses used once at join time. Empty for the first node
    /// of a cluster.
    #[serde(default)]
    pub seeds: Vec<String>,
}

impl NodeConfig {
    fn default_bind() -> String {
        "127.0.0.1:6500".into()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }

    /// Returns a config for a two-node local cluster's second member.
    pub fn default_example() -> Self {
        Self {
            bind: "127.0.0.1:6501".into(),
            seeds: vec!["127.0.0.1:6500".into()],
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            seeds: Vec::new(),
        }
    }
}
