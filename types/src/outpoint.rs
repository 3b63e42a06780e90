//! The collateral outpoint that uniquely identifies a service node.

use crate::hash::TxId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the transaction output holding a node's locked collateral.
///
/// This is the registry's uniqueness key: the network allows at most one
/// live node entry per collateral reference. A node re-announcing with new
/// keys or a new address keeps its identity as long as the collateral
/// stays the same.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollateralRef {
    /// Transaction that created the collateral output.
    pub txid: TxId,
    /// Index of the output within that transaction.
    pub vout: u32,
}

impl CollateralRef {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Canonical bytes for hashing and signing: txid followed by the
    /// little-endian output index.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(self.txid.as_bytes());
        out[32..].copy_from_slice(&self.vout.to_le_bytes());
        out
    }
}

impl fmt::Debug for CollateralRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollateralRef({:?}:{})", self.txid, self.vout)
    }
}

impl fmt::Display for CollateralRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_bytes_include_index() {
        let a = CollateralRef::new(TxId::new([1u8; 32]), 0);
        let b = CollateralRef::new(TxId::new([1u8; 32]), 1);
        assert_ne!(a.to_bytes(), b.to_bytes());
        assert_eq!(&a.to_bytes()[..32], a.txid.as_bytes());
    }
}
