//! Payment scripts identifying subsidy recipients.

use crate::keys::PublicKey;
use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a standard pay-to-key-hash script.
pub const STANDARD_SCRIPT_LEN: usize = 25;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// A raw payment script.
///
/// The subsystem only ever constructs the standard 25-byte pay-to-key-hash
/// form, but inbound data may carry anything, so the length check in
/// [`PayeeScript::is_standard`] is part of gossip validation.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayeeScript(pub Vec<u8>);

impl PayeeScript {
    /// Standard pay-to-key-hash script for the given public key.
    pub fn pay_to_pubkey(key: &PublicKey) -> Self {
        let mut hasher = Blake2b::<U20>::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();

        let mut script = Vec::with_capacity(STANDARD_SCRIPT_LEN);
        script.push(OP_DUP);
        script.push(OP_HASH160);
        script.push(20);
        script.extend_from_slice(&digest);
        script.push(OP_EQUALVERIFY);
        script.push(OP_CHECKSIG);
        Self(script)
    }

    /// Whether this script has the standard pay-to-key-hash size.
    pub fn is_standard(&self) -> bool {
        self.0.len() == STANDARD_SCRIPT_LEN
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short human-readable form (key-hash hex) used in log lines and
    /// payment summaries.
    pub fn to_short_string(&self) -> String {
        let body = if self.0.len() == STANDARD_SCRIPT_LEN {
            &self.0[3..23]
        } else {
            &self.0[..self.0.len().min(20)]
        };
        hex::encode(body)
    }
}

impl fmt::Debug for PayeeScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayeeScript({})", self.to_short_string())
    }
}

impl fmt::Display for PayeeScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_short_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pay_to_pubkey_is_standard() {
        let script = PayeeScript::pay_to_pubkey(&PublicKey([9u8; 32]));
        assert!(script.is_standard());
        assert_eq!(script.as_bytes()[0], OP_DUP);
        assert_eq!(script.as_bytes()[24], OP_CHECKSIG);
    }

    #[test]
    fn distinct_keys_distinct_scripts() {
        let a = PayeeScript::pay_to_pubkey(&PublicKey([1u8; 32]));
        let b = PayeeScript::pay_to_pubkey(&PublicKey([2u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn nonstandard_script_detected() {
        assert!(!PayeeScript(vec![1, 2, 3]).is_standard());
    }
}
