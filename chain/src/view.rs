use obol_types::{Amount, BlockHash, CollateralRef};

/// Result of looking up a collateral output on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateralStatus {
    /// The output exists, is unspent, holds the given value, and its
    /// containing block has the given number of confirmations.
    Unspent { value: Amount, confirmations: u32 },
    /// The output has been spent.
    Spent,
    /// No such output is known.
    Unknown,
}

impl CollateralStatus {
    /// True when the output is unspent with at least `min_confirmations`
    /// confirmations and exactly the expected value.
    pub fn is_valid_collateral(&self, expected: Amount, min_confirmations: u32) -> bool {
        matches!(
            self,
            CollateralStatus::Unspent { value, confirmations }
                if *value == expected && *confirmations >= min_confirmations
        )
    }
}

/// Read-only access to chain state.
///
/// Implementations must answer from a consistent snapshot within a single
/// call but may advance between calls.
pub trait ChainView: Send + Sync {
    /// Height of the current best block, or `None` before any block is known.
    fn tip_height(&self) -> Option<u32>;

    /// Hash of the block at `height` on the active chain.
    fn hash_by_height(&self, height: u32) -> Option<BlockHash>;

    /// Height of `hash` if it is on the active chain.
    fn height_of(&self, hash: &BlockHash) -> Option<u32>;

    /// Timestamp (unix seconds) of the block at `height`.
    fn block_time(&self, height: u32) -> Option<u64>;

    /// Look up a collateral output.
    fn collateral_status(&self, outpoint: &CollateralRef) -> CollateralStatus;

    /// Unix time the tip block was received by this node. Used to detect a
    /// stale chain view.
    fn tip_received_at(&self) -> Option<u64>;
}
