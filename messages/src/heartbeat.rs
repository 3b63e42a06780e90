use obol_crypto::{msg_hash, sign_message, verify_signature};
use obol_types::{BlockHash, CollateralRef, MsgHash, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Periodic liveness proof signed with the operator key.
///
/// The anchor hash pins the heartbeat to a recent block on the signer's
/// chain, so a node on a long-stale fork cannot stay "alive".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub collateral: CollateralRef,
    pub anchor_hash: BlockHash,
    pub sig_time: u64,
    pub signature: Signature,
}

impl Heartbeat {
    pub fn new(collateral: CollateralRef, anchor_hash: BlockHash, sig_time: u64) -> Self {
        Heartbeat { collateral, anchor_hash, sig_time, signature: Signature::empty() }
    }

    /// Identity hash for relay dedup. Covers the collateral and sig time but
    /// not the signature, so a re-signed copy of the same heartbeat does not
    /// relay twice.
    pub fn identity_hash(&self) -> MsgHash {
        msg_hash(&[&self.collateral.to_bytes(), &self.sig_time.to_le_bytes()])
    }

    fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(36 + 32 + 8);
        msg.extend_from_slice(&self.collateral.to_bytes());
        msg.extend_from_slice(self.anchor_hash.as_bytes());
        msg.extend_from_slice(&self.sig_time.to_le_bytes());
        msg
    }

    pub fn sign(&mut self, operator_key: &PrivateKey) {
        self.signature = sign_message(operator_key, &self.signing_message());
    }

    pub fn verify(&self, operator_pubkey: &PublicKey) -> bool {
        verify_signature(operator_pubkey, &self.signing_message(), &self.signature)
    }
}
