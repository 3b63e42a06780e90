use obol_crypto::{msg_hash, sign_message, verify_signature};
use obol_types::{CollateralRef, MsgHash, PayeeScript, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Vote for which payee a given block must pay, signed with the voter's
/// operator key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVote {
    pub voter: CollateralRef,
    pub block_height: u32,
    pub payee: PayeeScript,
    pub signature: Signature,
}

impl PaymentVote {
    pub fn new(voter: CollateralRef, block_height: u32, payee: PayeeScript) -> Self {
        PaymentVote { voter, block_height, payee, signature: Signature::empty() }
    }

    /// Identity hash for dedup. One vote per voter per height: a voter who
    /// re-signs a different payee for the same height produces a different
    /// hash, which the ledger treats as a double-vote attempt.
    pub fn identity_hash(&self) -> MsgHash {
        msg_hash(&[
            &self.payee.0,
            &self.block_height.to_le_bytes(),
            &self.voter.to_bytes(),
        ])
    }

    fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(36 + 4 + self.payee.0.len());
        msg.extend_from_slice(&self.voter.to_bytes());
        msg.extend_from_slice(&self.block_height.to_le_bytes());
        msg.extend_from_slice(&self.payee.0);
        msg
    }

    pub fn sign(&mut self, operator_key: &PrivateKey) {
        self.signature = sign_message(operator_key, &self.signing_message());
    }

    pub fn verify(&self, operator_pubkey: &PublicKey) -> bool {
        verify_signature(operator_pubkey, &self.signing_message(), &self.signature)
    }
}
