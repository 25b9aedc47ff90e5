//! Node configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `CHAIN_*` environment variables. Command-line flags are applied last.

use chain_consensus::DIFFICULTY;
use chain_db::DatabaseConfig;
use chain_network::NetworkConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "chain.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity; also the port the node listens on
    pub node_id: String,

    /// Directory holding the block store and wallet file
    pub data_dir: PathBuf,

    /// Host part of the advertised node address
    pub host: String,

    /// Peers known at startup; the first one is the bootstrap node
    pub known_nodes: Vec<String>,

    /// Leading zero bits required of a block hash
    pub difficulty: u32,

    /// Default tracing filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "3000".to_string(),
            data_dir: PathBuf::from("."),
            host: "localhost".to_string(),
            known_nodes: vec!["localhost:3000".to_string()],
            difficulty: DIFFICULTY,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Layer the config file and environment over the defaults.
    ///
    /// A missing file is only an error when it was named explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        Config::builder()
            .set_default("node_id", defaults.node_id)?
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default("host", defaults.host)?
            .set_default("known_nodes", defaults.known_nodes)?
            .set_default("difficulty", i64::from(defaults.difficulty))?
            .set_default("log_level", defaults.log_level)?
            .add_source(File::from(file).required(required))
            .add_source(
                Environment::with_prefix("CHAIN")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("known_nodes"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.trim().is_empty() {
            return Err("node id must be set (use --node-id or NODE_ID)".to_string());
        }
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }
        if !(1..=255).contains(&self.difficulty) {
            return Err(format!("difficulty {} is outside 1..=255", self.difficulty));
        }
        Ok(())
    }

    /// Address this node listens on and advertises
    pub fn node_address(&self) -> String {
        format!("{}:{}", self.host, self.node_id)
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::for_node(&self.data_dir, &self.node_id)
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig::new(self.node_address()).with_known_nodes(self.known_nodes.clone())
    }
}
