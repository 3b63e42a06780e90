use std::collections::{BTreeMap, HashMap};

use obol_chain::{ChainView, SporkId, SporkSet};
use obol_messages::{Message, PaymentVote, Peer, SyncCategory};
use obol_registry::{GossipOutcome, PaymentSchedule, Registry};
use obol_types::params::{
    block_value, node_payment, SCHEDULE_LOOKAHEAD, SIGNATURES_TOTAL, VOTE_FUTURE_BLOCKS,
    VOTE_RETENTION_MIN_BLOCKS,
};
use obol_types::{
    BlockTransaction, CollateralRef, MsgHash, PayeeScript, PrivateKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tally::BlockPayeeTally;

/// When a new tip arrives, nodes vote for the block this far ahead, so the
/// tally is complete before the block is produced.
pub const VOTE_TARGET_OFFSET: u32 = 10;

/// Minimum votes a payee needs in a past tally to count as "paid" there.
const LAST_PAID_MIN_VOTES: u32 = 2;

/// How far behind the tip votes remain acceptable: 1.25 x enabled nodes.
fn history_window(enabled: usize) -> u32 {
    (enabled as u32).saturating_mul(5) / 4
}

/// Every payment vote this peer knows, tallied per block.
#[derive(Default, Serialize, Deserialize)]
pub struct PaymentLedger {
    current_height: u32,
    votes: HashMap<MsgHash, PaymentVote>,
    blocks: BTreeMap<u32, BlockPayeeTally>,
    /// Highest height each node has voted at, for double-vote rejection.
    last_votes: HashMap<CollateralRef, u32>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_height(&mut self, height: u32) {
        self.current_height = height;
    }

    pub fn current_height(&self) -> u32 {
        self.current_height
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    fn can_vote(&self, voter: &CollateralRef, height: u32) -> bool {
        self.last_votes.get(voter).is_none_or(|&h| height > h)
    }

    /// Store a vote that already passed validation.
    pub fn record_vote(&mut self, vote: &PaymentVote) -> bool {
        let hash = vote.identity_hash();
        if self.votes.contains_key(&hash) {
            return false;
        }
        self.blocks
            .entry(vote.block_height)
            .or_default()
            .add_vote(&vote.payee);
        let last = self.last_votes.entry(vote.voter).or_insert(0);
        *last = (*last).max(vote.block_height);
        self.votes.insert(hash, vote.clone());
        true
    }

    /// Validate and store a gossiped vote.
    pub fn ingest_vote(
        &mut self,
        vote: &PaymentVote,
        registry: &Registry,
        chain: &dyn ChainView,
    ) -> GossipOutcome {
        if self.votes.contains_key(&vote.identity_hash()) {
            return GossipOutcome::Ignored;
        }
        let Some(tip) = chain.tip_height() else {
            return GossipOutcome::Ignored;
        };
        // Acceptance window: a quarter again the enabled count into the
        // past, a fixed hop into the future.
        let past_bound = history_window(registry.count_enabled(None));
        if vote.block_height > tip + VOTE_FUTURE_BLOCKS
            || vote.block_height + past_bound < tip
        {
            return GossipOutcome::Rejected { dos_score: 20 };
        }
        let Some(node) = registry.find(&vote.voter) else {
            return GossipOutcome::UnknownNode;
        };
        if !self.can_vote(&vote.voter, vote.block_height) {
            debug!(voter = %vote.voter, height = vote.block_height, "duplicate payment vote");
            return GossipOutcome::Ignored;
        }
        // Only nodes near the top of the rank order may vote; a rank we
        // cannot compute (missing anchor block) is no offense.
        match registry.rank(&vote.voter, vote.block_height, chain) {
            Some(rank) if rank > SIGNATURES_TOTAL * 2 => {
                return GossipOutcome::Rejected { dos_score: 20 };
            }
            None => return GossipOutcome::Ignored,
            Some(_) => {}
        }
        if !vote.verify(&node.operator_pubkey) {
            return GossipOutcome::Rejected { dos_score: 20 };
        }
        self.record_vote(vote);
        debug!(voter = %vote.voter, height = vote.block_height, "payment vote accepted");
        GossipOutcome::Accepted
    }

    /// Payee with the most votes at a height.
    pub fn get_block_payee(&self, height: u32) -> Option<PayeeScript> {
        self.blocks.get(&height).and_then(|t| t.top_payee()).cloned()
    }

    pub fn tally_at(&self, height: u32) -> Option<&BlockPayeeTally> {
        self.blocks.get(&height)
    }

    pub fn required_payments_string(&self, height: u32) -> String {
        self.blocks
            .get(&height)
            .map(|t| t.required_payments_string())
            .unwrap_or_else(|| "Unknown".to_owned())
    }

    /// Consensus check on a block's payment transaction.
    pub fn is_transaction_valid(
        &self,
        tx: &BlockTransaction,
        height: u32,
        registry: &Registry,
        sporks: &SporkSet,
        now: u64,
    ) -> bool {
        let Some(tally) = self.blocks.get(&height) else {
            return true;
        };
        // The enforcement count only trusts aged nodes; off enforcement the
        // raw census is close enough. Drift absorbs the nodes each peer sees
        // that its neighbors do not.
        let counted = if sporks.is_active(SporkId::PaymentEnforcement, now) {
            registry.stable_size(now)
        } else {
            registry.len()
        };
        let count = counted + registry.network().node_count_drift();
        let required = node_payment(height, block_value(height), count);
        tally.is_transaction_valid(tx, required)
    }

    /// Drop votes far enough behind the tip. Retention scales with network
    /// size so larger networks keep proportionally more history.
    pub fn cleanup(&mut self, enabled_count: usize) {
        let retention =
            ((enabled_count as u32).saturating_mul(5) / 4).max(VOTE_RETENTION_MIN_BLOCKS);
        let cutoff = self.current_height.saturating_sub(retention);
        let before = self.votes.len();
        self.votes.retain(|_, v| v.block_height >= cutoff);
        self.blocks.retain(|&h, _| h >= cutoff);
        if before != self.votes.len() {
            debug!(dropped = before - self.votes.len(), cutoff, "pruned payment votes");
        }
    }

    /// Push our vote set to a peer running bootstrap sync, bounded to the
    /// acceptance window so the receiver does not reject half of it.
    pub fn sync_to_peer(&self, peer: &dyn Peer, enabled_count: usize) {
        let past_bound = history_window(enabled_count);
        let mut sent = 0u32;
        for vote in self.votes.values() {
            if vote.block_height + past_bound < self.current_height
                || vote.block_height > self.current_height + VOTE_FUTURE_BLOCKS
            {
                continue;
            }
            peer.send(Message::Vote(vote.clone()));
            sent += 1;
        }
        peer.send(Message::SyncCount { category: SyncCategory::PaymentVotes, count: sent });
        debug!(peer = peer.id(), sent, "served payment votes");
    }

    /// Cast our own vote for an upcoming block, if we are elected to.
    ///
    /// Only the top `SIGNATURES_TOTAL` ranked nodes vote for a given height.
    /// The payee is whatever the payment queue says, so honest voters
    /// converge on one candidate.
    pub fn produce_vote(
        &mut self,
        target_height: u32,
        our_collateral: &CollateralRef,
        operator_key: &PrivateKey,
        registry: &mut Registry,
        chain: &dyn ChainView,
        now: u64,
    ) -> Option<PaymentVote> {
        if !self.can_vote(our_collateral, target_height) {
            return None;
        }
        let rank = registry.rank(our_collateral, target_height, chain)?;
        if rank > SIGNATURES_TOTAL {
            return None;
        }
        let winner = registry.next_payment_candidate(target_height, self, chain, now)?;
        let payee = registry.find(&winner)?.payee();
        let mut vote = PaymentVote::new(*our_collateral, target_height, payee);
        vote.sign(operator_key);
        info!(height = target_height, winner = %winner, "casting payment vote");
        self.record_vote(&vote);
        Some(vote)
    }

    /// React to a new chain tip: advance the height and, when `local` is
    /// given, vote for the block `VOTE_TARGET_OFFSET` ahead.
    pub fn process_block(
        &mut self,
        tip_height: u32,
        local: Option<(&CollateralRef, &PrivateKey)>,
        registry: &mut Registry,
        chain: &dyn ChainView,
        now: u64,
    ) -> Option<PaymentVote> {
        self.update_height(tip_height);
        let (collateral, key) = local?;
        self.produce_vote(
            tip_height + VOTE_TARGET_OFFSET,
            collateral,
            key,
            registry,
            chain,
            now,
        )
    }
}

impl PaymentSchedule for PaymentLedger {
    fn is_scheduled(&self, payee: &PayeeScript, not_height: u32) -> bool {
        for height in self.current_height..=self.current_height + SCHEDULE_LOOKAHEAD {
            if height == not_height {
                continue;
            }
            if self.get_block_payee(height).as_ref() == Some(payee) {
                return true;
            }
        }
        false
    }

    fn last_paid_height(&self, payee: &PayeeScript) -> Option<u32> {
        self.blocks
            .range(..=self.current_height)
            .rev()
            .find(|(_, tally)| tally.has_payee_with_votes(payee, LAST_PAID_MIN_VOTES))
            .map(|(&height, _)| height)
    }
}
