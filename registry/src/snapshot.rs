use obol_types::NetworkId;
use serde::{Deserialize, Serialize};

use crate::identity::NodeIdentity;
use crate::registry::Registry;

/// Serializable image of the registry for checkpointing across restarts.
///
/// Dedup and throttle maps are deliberately not captured; they are
/// session-scoped.
#[derive(Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub network: NetworkId,
    pub nodes: Vec<NodeIdentity>,
}

impl Registry {
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            network: self.network(),
            nodes: self.iter().cloned().collect(),
        }
    }

    pub fn restore(snapshot: RegistrySnapshot) -> Registry {
        let mut registry = Registry::new(snapshot.network);
        for node in snapshot.nodes {
            registry.add(node);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obol_crypto::generate_keypair;
    use obol_messages::Broadcast;
    use obol_types::{CollateralRef, Signature, TxId};

    #[test]
    fn snapshot_round_trip_preserves_nodes() {
        let mut registry = Registry::new(NetworkId::Dev);
        for i in 0..3u8 {
            let bcast = Broadcast {
                collateral: CollateralRef { txid: TxId([i; 32]), vout: 0 },
                address: format!("10.0.0.{i}:29433")
                    .parse::<std::net::SocketAddr>()
                    .unwrap()
                    .into(),
                collateral_pubkey: generate_keypair().public,
                operator_pubkey: generate_keypair().public,
                sig_time: 1_000 + u64::from(i),
                protocol_version: obol_types::params::PROTOCOL_VERSION,
                signature: Signature::empty(),
                last_heartbeat: None,
            };
            registry.add(NodeIdentity::from_broadcast(&bcast));
        }

        let snap = registry.snapshot();
        let encoded = bincode::serialize(&snap).unwrap();
        let decoded: RegistrySnapshot = bincode::deserialize(&encoded).unwrap();

        let restored = Registry::restore(decoded);
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.network(), NetworkId::Dev);
        let first = CollateralRef { txid: TxId([0u8; 32]), vout: 0 };
        assert_eq!(restored.find(&first).unwrap().sig_time, 1_000);
    }
}
