//! Network identifiers and per-network parameters.

use serde::{Deserialize, Serialize};

/// Which Obol network a node participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Main,
    Test,
    /// Local development network: relaxed address checks, short timeouts.
    Dev,
}

impl NetworkId {
    /// Network magic bytes, written into checkpoint files and message
    /// framing so data from one network is never accepted on another.
    pub fn magic(&self) -> [u8; 4] {
        match self {
            NetworkId::Main => [0x4f, 0x42, 0x4c, 0x4d],
            NetworkId::Test => [0x4f, 0x42, 0x4c, 0x54],
            NetworkId::Dev => [0x4f, 0x42, 0x4c, 0x44],
        }
    }

    /// Default P2P port.
    pub fn default_port(&self) -> u16 {
        match self {
            NetworkId::Main => 9433,
            NetworkId::Test => 19433,
            NetworkId::Dev => 29433,
        }
    }

    /// Whether private/local service addresses are acceptable in
    /// broadcasts. Only the dev network tolerates them.
    pub fn allows_local_addresses(&self) -> bool {
        matches!(self, NetworkId::Dev)
    }

    /// Allowance applied to the enabled-node count when computing the
    /// required payment: peers never agree exactly on the count, so the
    /// validation side pads it before deriving the minimum payment.
    pub fn node_count_drift(&self) -> usize {
        match self {
            NetworkId::Main => 4,
            NetworkId::Test | NetworkId::Dev => 2,
        }
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkId::Main => write!(f, "main"),
            NetworkId::Test => write!(f, "test"),
            NetworkId::Dev => write!(f, "dev"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magics_are_distinct() {
        assert_ne!(NetworkId::Main.magic(), NetworkId::Test.magic());
        assert_ne!(NetworkId::Test.magic(), NetworkId::Dev.magic());
    }

    #[test]
    fn only_dev_allows_local() {
        assert!(NetworkId::Dev.allows_local_addresses());
        assert!(!NetworkId::Main.allows_local_addresses());
    }
}
