use obol_crypto::{msg_hash, sign_message, verify_signature};
use obol_types::{CollateralRef, MsgHash, NodeAddress, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::heartbeat::Heartbeat;

/// Service-node announcement, signed with the collateral key.
///
/// Carries both keys for the node: the collateral key proves control of the
/// locked funds, the operator key authenticates everything the running node
/// signs afterwards (heartbeats and payment votes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub collateral: CollateralRef,
    pub address: NodeAddress,
    pub collateral_pubkey: PublicKey,
    pub operator_pubkey: PublicKey,
    pub sig_time: u64,
    pub protocol_version: u32,
    pub signature: Signature,
    /// Most recent heartbeat, piggybacked so receivers can mark the node
    /// alive without waiting for the next heartbeat round.
    pub last_heartbeat: Option<Heartbeat>,
}

impl Broadcast {
    /// Identity hash for relay dedup: sig time plus collateral key. A fresh
    /// announcement from the same node hashes differently, so updates still
    /// propagate.
    pub fn identity_hash(&self) -> MsgHash {
        msg_hash(&[&self.sig_time.to_le_bytes(), &self.collateral_pubkey.0])
    }

    fn signing_message(&self) -> Vec<u8> {
        let addr = self.address.to_string();
        let mut msg = Vec::with_capacity(addr.len() + 8 + 64 + 4);
        msg.extend_from_slice(addr.as_bytes());
        msg.extend_from_slice(&self.sig_time.to_le_bytes());
        msg.extend_from_slice(&self.collateral_pubkey.0);
        msg.extend_from_slice(&self.operator_pubkey.0);
        msg.extend_from_slice(&self.protocol_version.to_le_bytes());
        msg
    }

    pub fn sign(&mut self, collateral_key: &PrivateKey) {
        self.signature = sign_message(collateral_key, &self.signing_message());
    }

    /// Verify against the embedded collateral key.
    pub fn verify(&self) -> bool {
        verify_signature(&self.collateral_pubkey, &self.signing_message(), &self.signature)
    }
}
