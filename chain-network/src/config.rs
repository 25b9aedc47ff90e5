//! Network configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Address a node listens on when none is configured
pub const DEFAULT_NODE_ADDRESS: &str = "localhost:3000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address this node listens on and advertises to peers
    pub node_address: String,

    /// Peers known at startup; the first one is the bootstrap node
    pub known_nodes: Vec<String>,

    /// Timeout for outbound connections
    pub connect_timeout: Duration,

    /// Largest accepted message, command tag included
    pub max_message_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_address: DEFAULT_NODE_ADDRESS.to_string(),
            known_nodes: vec![DEFAULT_NODE_ADDRESS.to_string()],
            connect_timeout: Duration::from_secs(5),
            max_message_size: 32 * 1024 * 1024, // 32 MB
        }
    }
}

impl NetworkConfig {
    pub fn new(node_address: impl Into<String>) -> Self {
        Self {
            node_address: node_address.into(),
            ..Self::default()
        }
    }

    pub fn with_known_nodes(mut self, nodes: Vec<String>) -> Self {
        self.known_nodes = nodes;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Bootstrap node, unless this node is the bootstrap node itself
    pub fn bootstrap_node(&self) -> Option<&str> {
        self.known_nodes
            .first()
            .map(String::as_str)
            .filter(|node| *node != self.node_address)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.node_address.is_empty() {
            return Err("Node address must be specified".to_string());
        }

        if self.known_nodes.iter().any(String::is_empty) {
            return Err("Known node addresses must not be empty".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than 0".to_string());
        }

        if self.max_message_size <= crate::message::COMMAND_LEN {
            return Err("Maximum message size must exceed the command tag".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.node_address, DEFAULT_NODE_ADDRESS);
        assert_eq!(config.bootstrap_node(), None);
    }

    #[test]
    fn test_config_builder() {
        let config = NetworkConfig::new("localhost:3001")
            .with_known_nodes(vec!["localhost:3000".into()])
            .with_connect_timeout(Duration::from_millis(250));

        assert_eq!(config.bootstrap_node(), Some("localhost:3000"));
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_config_validation() {
        let mut config = NetworkConfig::new("");
        assert!(config.validate().is_err());

        config.node_address = "localhost:3001".into();
        config.max_message_size = 4;
        assert!(config.validate().is_err());

        config.max_message_size = 1024;
        config.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
