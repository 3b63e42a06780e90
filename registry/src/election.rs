use obol_chain::ChainView;
use obol_crypto::blake2b_256_multi;
use obol_types::params::{
    MIN_PROTOCOL_BEFORE_ENFORCEMENT, SCORE_LOOKBACK,
};
use obol_types::{BlockHash, CollateralRef, PayeeScript};
use tracing::debug;

use crate::identity::NodeIdentity;
use crate::registry::Registry;

/// Payment history the election needs from the vote ledger. Implemented by
/// the payments crate; kept as a trait so the registry does not depend on
/// it.
pub trait PaymentSchedule {
    /// True when the payee is already slated for payment in the near-future
    /// vote window, excluding `not_height`.
    fn is_scheduled(&self, payee: &PayeeScript, not_height: u32) -> bool;

    /// Most recent height at which the payee won a block, if any.
    fn last_paid_height(&self, payee: &PayeeScript) -> Option<u32>;
}

/// No payment history; every node looks unpaid.
pub struct NoSchedule;

impl PaymentSchedule for NoSchedule {
    fn is_scheduled(&self, _payee: &PayeeScript, _not_height: u32) -> bool {
        false
    }

    fn last_paid_height(&self, _payee: &PayeeScript) -> Option<u32> {
        None
    }
}

/// Deterministic per-block score of a node, ordered over the full 256 bits.
///
/// `d2 = H(anchor)` and `d3 = H(anchor || collateral)`; the score is
/// `|d3 - d2|`. Every peer with the same chain computes the same scores, so
/// ranking needs no communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    limbs: [u64; 4],
}

impl Score {
    pub const ZERO: Score = Score { limbs: [0; 4] };

    fn from_digest(bytes: &[u8; 32]) -> [u64; 4] {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *limb = u64::from_le_bytes(raw);
        }
        limbs
    }

    /// 256-bit subtraction with borrow; caller guarantees `a >= b`.
    fn sub(a: [u64; 4], b: [u64; 4]) -> [u64; 4] {
        let mut out = [0u64; 4];
        let mut borrow = 0u64;
        for i in 0..4 {
            let (d, b1) = a[i].overflowing_sub(b[i]);
            let (d, b2) = d.overflowing_sub(borrow);
            out[i] = d;
            borrow = u64::from(b1) + u64::from(b2);
        }
        out
    }

    fn cmp_limbs(a: &[u64; 4], b: &[u64; 4]) -> std::cmp::Ordering {
        // Most significant limb last in little-endian order.
        a.iter().rev().cmp(b.iter().rev())
    }

    pub fn compute(anchor: &BlockHash, collateral: &CollateralRef) -> Score {
        let d2 = Self::from_digest(&blake2b_256_multi(&[anchor.as_bytes()]));
        let d3 = Self::from_digest(&blake2b_256_multi(&[
            anchor.as_bytes(),
            &collateral.to_bytes(),
        ]));
        let limbs = match Self::cmp_limbs(&d3, &d2) {
            std::cmp::Ordering::Less => Self::sub(d2, d3),
            _ => Self::sub(d3, d2),
        };
        Score { limbs }
    }

    /// Lossy 64-bit projection (little-endian low limb). Loses the high 192
    /// bits, so it must never drive ordering; it exists for logs and status
    /// output where a u64 is all there is room for.
    pub fn rank_score(&self) -> u64 {
        self.limbs[0]
    }

    pub fn cmp_full(&self, other: &Score) -> std::cmp::Ordering {
        Self::cmp_limbs(&self.limbs, &other.limbs)
    }
}

/// Score a node for `block_height`, anchored `SCORE_LOOKBACK` blocks back.
pub fn calculate_score(
    collateral: &CollateralRef,
    block_height: u32,
    chain: &dyn ChainView,
) -> Option<Score> {
    let anchor_height = block_height.checked_sub(SCORE_LOOKBACK)?;
    let anchor = chain.hash_by_height(anchor_height)?;
    Some(Score::compute(&anchor, collateral))
}

/// How recently a node must NOT have announced to enter the payment queue,
/// scaled by network size: 2.6 minutes per enabled node.
fn min_queue_age(enabled: usize) -> u64 {
    (enabled as u64) * 156
}

impl Registry {
    /// Highest-scoring enabled node for a block, used to sanity-check votes.
    pub fn current_winner(&self, block_height: u32, chain: &dyn ChainView) -> Option<&NodeIdentity> {
        self.iter()
            .filter(|n| n.is_enabled() && n.protocol_version >= MIN_PROTOCOL_BEFORE_ENFORCEMENT)
            .filter_map(|n| calculate_score(&n.collateral, block_height, chain).map(|s| (s, n)))
            .max_by(|(a, na), (b, nb)| {
                a.cmp_full(b).then_with(|| nb.collateral.cmp(&na.collateral))
            })
            .map(|(_, n)| n)
    }

    /// Pick the node the network should pay at `block_height`.
    ///
    /// Two phases: order eligible nodes by how long they have gone unpaid,
    /// keep the most-starved tenth, then pick the highest scorer among them.
    /// The starvation ordering keeps payments fair; the score keeps the
    /// final choice unpredictable ahead of time.
    pub fn next_payment_candidate(
        &mut self,
        block_height: u32,
        schedule: &dyn PaymentSchedule,
        chain: &dyn ChainView,
        now: u64,
    ) -> Option<CollateralRef> {
        let enabled = self.count_enabled(None);
        if enabled == 0 {
            return None;
        }
        let queue_age = min_queue_age(enabled);

        let collect = |registry: &mut Registry, filter_by_age: bool| -> Vec<(u64, CollateralRef)> {
            let mut out = Vec::new();
            let collaterals: Vec<CollateralRef> =
                registry.iter().map(|n| n.collateral).collect();
            for collateral in collaterals {
                let last_paid_height = {
                    let node = match registry.find(&collateral) {
                        Some(n) => n,
                        None => continue,
                    };
                    if !node.is_enabled()
                        || node.protocol_version < MIN_PROTOCOL_BEFORE_ENFORCEMENT
                    {
                        continue;
                    }
                    if schedule.is_scheduled(&node.payee(), block_height) {
                        continue;
                    }
                    if filter_by_age && node.announce_age(now) < queue_age {
                        continue;
                    }
                    schedule.last_paid_height(&node.payee())
                };
                // Collateral must be at least as old (in confirmations) as
                // the network has nodes, or a wave of fresh collaterals
                // could crowd the queue.
                let Some(node) = registry.find_mut(&collateral) else { continue };
                if (node.input_age(chain) as usize) < enabled {
                    continue;
                }
                let last_paid_time =
                    last_paid_height.and_then(|h| chain.block_time(h));
                out.push((node.seconds_since_payment(now, last_paid_time), collateral));
            }
            out
        };

        let mut eligible = collect(self, true);
        // Too few candidates means the age filter is starving the queue,
        // typical while the network is young; rebuild without it. Already
        // scheduled payees stay excluded either way.
        if eligible.len() * 3 < enabled {
            debug!(
                eligible = eligible.len(),
                enabled, "thin payment queue, relaxing age filter"
            );
            eligible = collect(self, false);
        }
        if eligible.is_empty() {
            return None;
        }

        // Most starved first; collateral order breaks ties so every peer
        // agrees on the decile cut.
        eligible.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let tenth = (enabled / 10).max(1);
        eligible.truncate(tenth);

        eligible
            .into_iter()
            .filter_map(|(_, c)| calculate_score(&c, block_height, chain).map(|s| (s, c)))
            .max_by(|(a, ca), (b, cb)| a.cmp_full(b).then_with(|| cb.cmp(ca)))
            .map(|(_, c)| c)
    }

    /// Rank of a node among eligible peers at a height (1 = best score).
    pub fn rank(
        &self,
        collateral: &CollateralRef,
        block_height: u32,
        chain: &dyn ChainView,
    ) -> Option<u32> {
        self.ranks(block_height, chain)
            .into_iter()
            .find(|(_, c)| c == collateral)
            .map(|(rank, _)| rank)
    }

    /// All eligible nodes ordered by score, best first, 1-based.
    ///
    /// Eligibility here is deliberately independent of spork state and
    /// announce age: rank bounds vote acceptance, and it must not shift
    /// under in-flight votes when a spork toggles.
    pub fn ranks(&self, block_height: u32, chain: &dyn ChainView) -> Vec<(u32, CollateralRef)> {
        let mut scored: Vec<(Score, CollateralRef)> = self
            .iter()
            .filter(|n| n.is_enabled() && n.protocol_version >= MIN_PROTOCOL_BEFORE_ENFORCEMENT)
            .filter_map(|n| {
                calculate_score(&n.collateral, block_height, chain).map(|s| (s, n.collateral))
            })
            .collect();
        scored.sort_by(|(a, ca), (b, cb)| b.cmp_full(a).then_with(|| ca.cmp(cb)));
        scored
            .into_iter()
            .enumerate()
            .map(|(i, (_, c))| (i as u32 + 1, c))
            .collect()
    }

    pub fn by_rank(
        &self,
        rank: u32,
        block_height: u32,
        chain: &dyn ChainView,
    ) -> Option<CollateralRef> {
        self.ranks(block_height, chain)
            .into_iter()
            .find(|(r, _)| *r == rank)
            .map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obol_chain::MemoryChain;
    use obol_types::TxId;
    use proptest::prelude::*;

    fn outpoint(idx: u8) -> CollateralRef {
        CollateralRef { txid: TxId([idx; 32]), vout: 0 }
    }

    #[test]
    fn score_is_deterministic() {
        let anchor = BlockHash([5u8; 32]);
        let a = Score::compute(&anchor, &outpoint(1));
        let b = Score::compute(&anchor, &outpoint(1));
        assert_eq!(a, b);
        assert_ne!(a, Score::compute(&anchor, &outpoint(2)));
    }

    #[test]
    fn score_requires_lookback_depth() {
        let chain = MemoryChain::new();
        chain.push_blocks(50, 1_000, 60);
        assert!(calculate_score(&outpoint(1), 40, &chain).is_none());

        let chain = MemoryChain::new();
        chain.push_blocks(150, 1_000, 60);
        assert!(calculate_score(&outpoint(1), 140, &chain).is_some());
    }

    proptest! {
        // A one-bit change to the anchor reorders scores unpredictably, but
        // each peer computes identical values.
        #[test]
        fn score_avalanche(anchor_byte in any::<u8>(), flip_bit in 0usize..256) {
            let mut raw = [anchor_byte; 32];
            let base = Score::compute(&BlockHash(raw), &outpoint(1));
            raw[flip_bit / 8] ^= 1 << (flip_bit % 8);
            let flipped = Score::compute(&BlockHash(raw), &outpoint(1));
            prop_assert_ne!(base, flipped);
        }

        #[test]
        fn rank_order_is_total(seed in any::<u8>()) {
            let anchor = BlockHash([seed; 32]);
            let mut scores: Vec<Score> =
                (0..20u8).map(|i| Score::compute(&anchor, &outpoint(i))).collect();
            scores.sort_by(|a, b| a.cmp_full(b));
            for w in scores.windows(2) {
                prop_assert!(w[0].cmp_full(&w[1]) != std::cmp::Ordering::Greater);
            }
        }
    }
}
