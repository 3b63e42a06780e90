//! 32-byte hash newtypes for blocks, transactions, and gossip messages.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! hash_type {
    ($(#[$doc:meta])* $name:ident, $label:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(&self.0))
            }
        }
    };
}

hash_type!(
    /// Hash of a chain block.
    BlockHash,
    "BlockHash"
);
hash_type!(
    /// Hash of the transaction that locked a node's collateral.
    TxId,
    "TxId"
);
hash_type!(
    /// Identity hash of a gossip message (broadcast, heartbeat, or vote).
    ///
    /// Used as the key in seen-sets for replay protection and in
    /// inventory announcements.
    MsgHash,
    "MsgHash"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash() {
        assert!(BlockHash::ZERO.is_zero());
        assert!(!BlockHash::new([1u8; 32]).is_zero());
    }

    #[test]
    fn display_is_full_hex() {
        let h = MsgHash::new([0xab; 32]);
        assert_eq!(h.to_string().len(), 64);
        assert!(h.to_string().starts_with("abab"));
    }

    #[test]
    fn ordering_is_bytewise() {
        let lo = BlockHash::new([0u8; 32]);
        let mut hi_bytes = [0u8; 32];
        hi_bytes[0] = 1;
        assert!(lo < BlockHash::new(hi_bytes));
    }
}
