use std::collections::HashMap;
use std::sync::RwLock;

use obol_types::{Amount, BlockHash, CollateralRef};

use crate::view::{ChainView, CollateralStatus};

#[derive(Default)]
struct Inner {
    /// Block hashes indexed by height.
    blocks: Vec<BlockHash>,
    /// Block timestamps indexed by height.
    times: Vec<u64>,
    heights: HashMap<BlockHash, u32>,
    collaterals: HashMap<CollateralRef, (Amount, u32)>,
    spent: HashMap<CollateralRef, bool>,
    tip_received_at: Option<u64>,
}

/// In-memory [`ChainView`] for tests and the dev network.
#[derive(Default)]
pub struct MemoryChain {
    inner: RwLock<Inner>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block with the given hash and timestamp.
    pub fn push_block(&self, hash: BlockHash, time: u64) {
        let mut inner = self.inner.write().unwrap();
        let height = inner.blocks.len() as u32;
        inner.heights.insert(hash, height);
        inner.blocks.push(hash);
        inner.times.push(time);
        inner.tip_received_at = Some(time);
    }

    /// Append `count` blocks with synthetic hashes, `spacing` seconds apart
    /// starting from `start_time`.
    pub fn push_blocks(&self, count: u32, start_time: u64, spacing: u64) {
        let first = self.tip_height().map(|h| h + 1).unwrap_or(0);
        for i in 0..count {
            let height = first + i;
            let mut raw = [0u8; 32];
            raw[..4].copy_from_slice(&height.to_le_bytes());
            raw[4] = 0xB1;
            self.push_block(BlockHash(raw), start_time + u64::from(i) * spacing);
        }
    }

    /// Register an unspent collateral output.
    pub fn add_collateral(&self, outpoint: CollateralRef, value: Amount, confirmations: u32) {
        let mut inner = self.inner.write().unwrap();
        inner.collaterals.insert(outpoint, (value, confirmations));
        inner.spent.insert(outpoint, false);
    }

    /// Mark a collateral output spent.
    pub fn spend_collateral(&self, outpoint: &CollateralRef) {
        let mut inner = self.inner.write().unwrap();
        inner.spent.insert(*outpoint, true);
    }

    /// Override the recorded time the tip arrived.
    pub fn set_tip_received_at(&self, time: u64) {
        self.inner.write().unwrap().tip_received_at = Some(time);
    }
}

impl ChainView for MemoryChain {
    fn tip_height(&self) -> Option<u32> {
        let inner = self.inner.read().unwrap();
        inner.blocks.len().checked_sub(1).map(|h| h as u32)
    }

    fn hash_by_height(&self, height: u32) -> Option<BlockHash> {
        self.inner.read().unwrap().blocks.get(height as usize).copied()
    }

    fn height_of(&self, hash: &BlockHash) -> Option<u32> {
        self.inner.read().unwrap().heights.get(hash).copied()
    }

    fn block_time(&self, height: u32) -> Option<u64> {
        self.inner.read().unwrap().times.get(height as usize).copied()
    }

    fn collateral_status(&self, outpoint: &CollateralRef) -> CollateralStatus {
        let inner = self.inner.read().unwrap();
        match inner.collaterals.get(outpoint) {
            Some(&(value, confirmations)) => {
                if inner.spent.get(outpoint).copied().unwrap_or(false) {
                    CollateralStatus::Spent
                } else {
                    CollateralStatus::Unspent { value, confirmations }
                }
            }
            None => CollateralStatus::Unknown,
        }
    }

    fn tip_received_at(&self) -> Option<u64> {
        self.inner.read().unwrap().tip_received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obol_types::{TxId, COIN};

    #[test]
    fn push_blocks_tracks_tip_and_heights() {
        let chain = MemoryChain::new();
        assert_eq!(chain.tip_height(), None);
        chain.push_blocks(10, 1_000, 60);
        assert_eq!(chain.tip_height(), Some(9));
        let h5 = chain.hash_by_height(5).unwrap();
        assert_eq!(chain.height_of(&h5), Some(5));
        assert_eq!(chain.block_time(9), Some(1_000 + 9 * 60));
    }

    #[test]
    fn collateral_lifecycle() {
        let chain = MemoryChain::new();
        let op = CollateralRef { txid: TxId([7u8; 32]), vout: 0 };
        assert_eq!(chain.collateral_status(&op), CollateralStatus::Unknown);

        chain.add_collateral(op, Amount(2_500 * COIN), 20);
        assert!(chain
            .collateral_status(&op)
            .is_valid_collateral(Amount(2_500 * COIN), 15));

        chain.spend_collateral(&op);
        assert_eq!(chain.collateral_status(&op), CollateralStatus::Spent);
    }

    #[test]
    fn collateral_confirmation_threshold() {
        let status = CollateralStatus::Unspent { value: Amount(2_500 * COIN), confirmations: 14 };
        assert!(!status.is_valid_collateral(Amount(2_500 * COIN), 15));
        let status = CollateralStatus::Unspent { value: Amount(2_499 * COIN), confirmations: 20 };
        assert!(!status.is_valid_collateral(Amount(2_500 * COIN), 15));
    }
}
