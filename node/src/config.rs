//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use obol_types::NetworkId;

use crate::NodeError;

/// Configuration for an Obol service node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to connect to.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Data directory for checkpoint files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Port to listen on for P2P connections.
    #[serde(default = "default_p2p_port")]
    pub port: u16,

    /// Whether this node should try to activate as a service node.
    #[serde(default)]
    pub service_node: bool,

    /// Hex-encoded 32-byte seed for the operator key. Generated fresh on
    /// every start when absent, which is fine for non-service nodes.
    #[serde(default)]
    pub operator_seed: Option<String>,

    /// Seconds between sync scheduler passes.
    #[serde(default = "default_sync_tick")]
    pub sync_tick_secs: u64,

    /// Seconds between registry/ledger prune passes.
    #[serde(default = "default_prune_tick")]
    pub prune_tick_secs: u64,

    /// Seconds between activation management passes.
    #[serde(default = "default_activation_tick")]
    pub activation_tick_secs: u64,

    /// Seconds between checkpoint dumps.
    #[serde(default = "default_checkpoint_tick")]
    pub checkpoint_tick_secs: u64,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./obol_data")
}

fn default_p2p_port() -> u16 {
    NetworkId::Dev.default_port()
}

fn default_sync_tick() -> u64 {
    1
}

fn default_prune_tick() -> u64 {
    60
}

fn default_activation_tick() -> u64 {
    60
}

fn default_checkpoint_tick() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            network: default_network(),
            data_dir: default_data_dir(),
            port: default_p2p_port(),
            service_node: false,
            operator_seed: None,
            sync_tick_secs: default_sync_tick(),
            prune_tick_secs: default_prune_tick(),
            activation_tick_secs: default_activation_tick(),
            checkpoint_tick_secs: default_checkpoint_tick(),
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Decode the configured operator seed, if any.
    pub fn operator_seed_bytes(&self) -> Result<Option<[u8; 32]>, NodeError> {
        let Some(seed) = &self.operator_seed else {
            return Ok(None);
        };
        let raw = hex::decode(seed).map_err(|e| NodeError::InvalidKey(e.to_string()))?;
        let arr: [u8; 32] = raw
            .try_into()
            .map_err(|_| NodeError::InvalidKey("seed must be 32 bytes".to_string()))?;
        Ok(Some(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = NodeConfig::from_toml_str("network = \"test\"").unwrap();
        assert_eq!(config.network, NetworkId::Test);
        assert_eq!(config.sync_tick_secs, 1);
        assert!(!config.service_node);
    }

    #[test]
    fn operator_seed_round_trips() {
        let mut config = NodeConfig::default();
        config.operator_seed = Some(hex::encode([7u8; 32]));
        assert_eq!(config.operator_seed_bytes().unwrap(), Some([7u8; 32]));

        config.operator_seed = Some("zz".to_string());
        assert!(config.operator_seed_bytes().is_err());
    }

    #[test]
    fn full_file_parses() {
        let toml = r#"
            network = "dev"
            data_dir = "/tmp/obol"
            port = 29433
            service_node = true
            operator_seed = "0101010101010101010101010101010101010101010101010101010101010101"
            prune_tick_secs = 30
        "#;
        let config = NodeConfig::from_toml_str(toml).unwrap();
        assert!(config.service_node);
        assert_eq!(config.prune_tick_secs, 30);
        assert_eq!(config.checkpoint_tick_secs, 600);
    }
}
