use std::collections::HashMap;

use obol_chain::{ChainView, SporkId, SporkSet};
use obol_messages::{Message, Peer, SyncCategory};
use tracing::{debug, info, warn};

use crate::stage::SyncStage;

/// Base quiet window for a stage; a stage that received data drains after
/// twice this, one that received nothing is abandoned after five times it.
pub const STAGE_TIMEOUT_SECONDS: u64 = 5;
/// Peers to ask per stage; a stage with no data is abandoned after three
/// times this many requests.
pub const PEER_ATTEMPT_THRESHOLD: u32 = 2;
/// Cooldown after a failed sync before starting over.
pub const FAILURE_BACKOFF_SECONDS: u64 = 60;
/// A tip older than this means the chain itself is still syncing.
pub const CHAIN_STALENESS_SECONDS: u64 = 3_600;

/// Point-in-time view of sync state, for status reporting.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub stage: SyncStage,
    pub attempt: u32,
    /// Summed peer-reported item counts per category.
    pub reported: HashMap<SyncCategory, u32>,
    /// Number of peers that reported each category.
    pub reporting_peers: HashMap<SyncCategory, u32>,
}

impl SyncProgress {
    /// Average reported item count for a category. The budget and community
    /// subsystems use this to tell "nothing to fetch" from "no one told us".
    pub fn expected_items(&self, category: SyncCategory) -> u32 {
        let peers = self.reporting_peers.get(&category).copied().unwrap_or(0);
        if peers == 0 {
            return 0;
        }
        self.reported.get(&category).copied().unwrap_or(0) / peers
    }
}

/// Drives the staged bootstrap sync.
///
/// One request per tick goes to a peer that has not served the current
/// stage yet. A stage that received data advances once it has gone quiet
/// for two timeouts. A stage that produced nothing at all is abandoned
/// once the request budget or the stage deadline runs out: harmless for
/// optional payloads, but when a spork says the network enforces that
/// data the whole sync fails and retries after a backoff. With no peers
/// connected the ladder still drains stage by stage, so an isolated node
/// ends up Finished rather than wedged.
pub struct SyncCoordinator {
    stage: SyncStage,
    stage_started_at: u64,
    last_item_at: u64,
    items_this_stage: u32,
    attempt: u32,
    reported: HashMap<SyncCategory, u32>,
    reporting_peers: HashMap<SyncCategory, u32>,
    last_failure_at: u64,
}

impl SyncCoordinator {
    pub fn new(now: u64) -> Self {
        SyncCoordinator {
            stage: SyncStage::Initial,
            stage_started_at: now,
            last_item_at: now,
            items_this_stage: 0,
            attempt: 0,
            reported: HashMap::new(),
            reporting_peers: HashMap::new(),
            last_failure_at: 0,
        }
    }

    pub fn stage(&self) -> SyncStage {
        self.stage
    }

    pub fn is_synced(&self) -> bool {
        self.stage == SyncStage::Finished
    }

    pub fn is_failed(&self) -> bool {
        self.stage == SyncStage::Failed
    }

    pub fn status(&self) -> &'static str {
        self.stage.status()
    }

    pub fn progress(&self) -> SyncProgress {
        SyncProgress {
            stage: self.stage,
            attempt: self.attempt,
            reported: self.reported.clone(),
            reporting_peers: self.reporting_peers.clone(),
        }
    }

    /// Start over from the beginning.
    pub fn reset(&mut self, now: u64) {
        info!("restarting bootstrap sync");
        self.stage = SyncStage::Initial;
        self.stage_started_at = now;
        self.last_item_at = now;
        self.items_this_stage = 0;
        self.attempt = 0;
        self.reported.clear();
        self.reporting_peers.clear();
    }

    pub fn fail(&mut self, now: u64) {
        warn!(stage = ?self.stage, "bootstrap sync failed");
        self.stage = SyncStage::Failed;
        self.last_failure_at = now;
    }

    /// Record that a useful item for `category` arrived, holding the
    /// current stage open.
    pub fn note_item(&mut self, category: SyncCategory, now: u64) {
        if self.stage_for(category) == self.stage {
            self.last_item_at = now;
            self.items_this_stage += 1;
        }
    }

    /// Record spork data arriving (sporks are not a counted category).
    pub fn note_spork(&mut self, now: u64) {
        if self.stage == SyncStage::Sporks {
            self.last_item_at = now;
            self.items_this_stage += 1;
        }
    }

    /// Accumulate a peer's `sync-count` report.
    pub fn note_count(&mut self, category: SyncCategory, count: u32) {
        *self.reported.entry(category).or_insert(0) += count;
        *self.reporting_peers.entry(category).or_insert(0) += 1;
    }

    fn stage_for(&self, category: SyncCategory) -> SyncStage {
        match category {
            SyncCategory::NodeList => SyncStage::NodeList,
            SyncCategory::PaymentVotes => SyncStage::PaymentVotes,
            SyncCategory::BudgetItems => SyncStage::Budget,
            SyncCategory::CommunityVotes => SyncStage::CommunityVote,
        }
    }

    fn advance(&mut self, now: u64) {
        self.stage = self.stage.next();
        self.stage_started_at = now;
        self.last_item_at = now;
        self.items_this_stage = 0;
        self.attempt = 0;
        info!(stage = ?self.stage, "sync stage advanced");
    }

    /// Stages whose payload the network can insist on. A registry or vote
    /// ledger that stayed empty under active payment enforcement means the
    /// peers failed us, not that there was nothing to fetch.
    fn stage_is_enforced(&self, sporks: &SporkSet, now: u64) -> bool {
        matches!(self.stage, SyncStage::NodeList | SyncStage::PaymentVotes)
            && sporks.is_active(SporkId::PaymentEnforcement, now)
    }

    /// The chain view is stale when its tip stopped moving long ago; sync
    /// must not conclude against a chain that is itself behind.
    pub fn chain_is_stale(&self, chain: &dyn ChainView, now: u64) -> bool {
        match chain.tip_received_at() {
            Some(at) => now.saturating_sub(at) > CHAIN_STALENESS_SECONDS,
            None => true,
        }
    }

    fn request_for(stage: SyncStage, vote_hint: u32) -> Option<(&'static str, Message)> {
        match stage {
            SyncStage::Sporks => Some(("spork-sync", Message::SporkRequest)),
            SyncStage::NodeList => Some(("node-list-sync", Message::ListRequest(None))),
            SyncStage::PaymentVotes => {
                Some(("vote-sync", Message::VoteSyncRequest { count: vote_hint }))
            }
            // Budget and community-vote payloads belong to external
            // subsystems; their stages only wait out the timeout.
            _ => None,
        }
    }

    /// One scheduler pass. `vote_hint` sizes the vote-sync request
    /// (typically the enabled node count).
    pub fn tick(
        &mut self,
        peers: &[&dyn Peer],
        chain: &dyn ChainView,
        sporks: &SporkSet,
        vote_hint: u32,
        now: u64,
    ) {
        match self.stage {
            SyncStage::Finished => return,
            SyncStage::Failed => {
                if now.saturating_sub(self.last_failure_at) > FAILURE_BACKOFF_SECONDS {
                    self.reset(now);
                }
                return;
            }
            SyncStage::Initial => {
                if !self.chain_is_stale(chain, now) {
                    self.advance(now);
                }
                return;
            }
            _ => {}
        }

        if self.chain_is_stale(chain, now) {
            debug!("chain view stale, sync holding");
            return;
        }

        if self.items_this_stage > 0 {
            if now >= self.last_item_at + 2 * STAGE_TIMEOUT_SECONDS {
                self.advance(now);
                return;
            }
        } else {
            let exhausted = self.attempt >= 3 * PEER_ATTEMPT_THRESHOLD
                || now >= self.stage_started_at + 5 * STAGE_TIMEOUT_SECONDS;
            if exhausted {
                if self.stage_is_enforced(sporks, now) {
                    self.fail(now);
                } else {
                    self.advance(now);
                }
                return;
            }
        }

        if let Some((flag, message)) = Self::request_for(self.stage, vote_hint) {
            if let Some(peer) = peers.iter().find(|p| !p.has_fulfilled(flag)) {
                debug!(peer = peer.id(), stage = ?self.stage, "requesting sync data");
                peer.set_fulfilled(flag);
                peer.send(message);
                self.attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obol_chain::MemoryChain;
    use obol_messages::QueuedPeer;

    fn fresh_chain(now: u64) -> MemoryChain {
        let chain = MemoryChain::new();
        chain.push_blocks(10, now - 600, 60);
        chain.set_tip_received_at(now - 30);
        chain
    }

    fn run_ticks(
        sync: &mut SyncCoordinator,
        peers: &[&dyn Peer],
        chain: &MemoryChain,
        sporks: &SporkSet,
        start: u64,
        ticks: u64,
    ) -> u64 {
        let mut now = start;
        for _ in 0..ticks {
            sync.tick(peers, chain, sporks, 0, now);
            now += 1;
        }
        now
    }

    #[test]
    fn isolated_node_walks_the_whole_ladder() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        let sporks = SporkSet::new();
        let mut sync = SyncCoordinator::new(now);

        // No peers and no data: every stage is abandoned on its deadline.
        run_ticks(&mut sync, &[], &chain, &sporks, now, 140);
        assert!(sync.is_synced());
    }

    #[test]
    fn stages_request_from_each_peer_once() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        let sporks = SporkSet::new();
        let mut sync = SyncCoordinator::new(now);
        let a = QueuedPeer::new(1, 70_912);
        let b = QueuedPeer::new(2, 70_912);
        let peers: Vec<&dyn Peer> = vec![&a, &b];

        sync.tick(&peers, &chain, &sporks, 0, now); // Initial -> Sporks
        assert_eq!(sync.stage(), SyncStage::Sporks);
        sync.tick(&peers, &chain, &sporks, 0, now);
        sync.tick(&peers, &chain, &sporks, 0, now);
        // Both peers asked exactly once.
        assert_eq!(a.drain(), vec![Message::SporkRequest]);
        assert_eq!(b.drain(), vec![Message::SporkRequest]);
        sync.tick(&peers, &chain, &sporks, 0, now + 1);
        assert_eq!(a.queued() + b.queued(), 0);
    }

    #[test]
    fn incoming_items_hold_the_stage_open() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        let sporks = SporkSet::new();
        let mut sync = SyncCoordinator::new(now);
        let peer = QueuedPeer::new(1, 70_912);
        let peers: Vec<&dyn Peer> = vec![&peer];

        let mut t = run_ticks(&mut sync, &peers, &chain, &sporks, now, 30);
        assert_eq!(sync.stage(), SyncStage::NodeList);

        // A steady trickle of list entries keeps the stage alive well past
        // the empty-stage deadline.
        for _ in 0..40 {
            sync.note_item(SyncCategory::NodeList, t);
            sync.tick(&peers, &chain, &sporks, 0, t);
            t += 1;
        }
        assert_eq!(sync.stage(), SyncStage::NodeList);

        // Two quiet timeouts drain it.
        run_ticks(&mut sync, &peers, &chain, &sporks, t, 12);
        assert_eq!(sync.stage(), SyncStage::PaymentVotes);
    }

    #[test]
    fn empty_enforced_stage_fails_instead_of_advancing() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        let sporks = SporkSet::new();
        sporks.set(SporkId::PaymentEnforcement, 0);
        let mut sync = SyncCoordinator::new(now);

        // The spork stage still drains empty; the node list must not.
        let t = run_ticks(&mut sync, &[], &chain, &sporks, now, 30);
        assert_eq!(sync.stage(), SyncStage::NodeList);

        let t = run_ticks(&mut sync, &[], &chain, &sporks, t, 30);
        assert!(sync.is_failed());

        // After the backoff the ladder starts over from the top.
        sync.tick(&[], &chain, &sporks, 0, t + FAILURE_BACKOFF_SECONDS + 1);
        assert_eq!(sync.stage(), SyncStage::Initial);
    }

    #[test]
    fn served_node_list_keeps_an_enforced_sync_alive() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        let sporks = SporkSet::new();
        sporks.set(SporkId::PaymentEnforcement, 0);
        let mut sync = SyncCoordinator::new(now);

        let t = run_ticks(&mut sync, &[], &chain, &sporks, now, 30);
        assert_eq!(sync.stage(), SyncStage::NodeList);

        // One real entry is enough to count the stage as served.
        sync.note_item(SyncCategory::NodeList, t);
        run_ticks(&mut sync, &[], &chain, &sporks, t, 15);
        assert_eq!(sync.stage(), SyncStage::PaymentVotes);
        assert!(!sync.is_failed());
    }

    #[test]
    fn failure_backs_off_then_restarts() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        let sporks = SporkSet::new();
        let mut sync = SyncCoordinator::new(now);
        sync.fail(now);
        assert!(sync.is_failed());

        sync.tick(&[], &chain, &sporks, 0, now + FAILURE_BACKOFF_SECONDS);
        assert!(sync.is_failed());
        sync.tick(&[], &chain, &sporks, 0, now + FAILURE_BACKOFF_SECONDS + 1);
        assert_eq!(sync.stage(), SyncStage::Initial);
    }

    #[test]
    fn stale_chain_blocks_progress() {
        let now = 1_000_000;
        let chain = fresh_chain(now);
        chain.set_tip_received_at(now - CHAIN_STALENESS_SECONDS - 10);
        let sporks = SporkSet::new();
        let mut sync = SyncCoordinator::new(now);

        run_ticks(&mut sync, &[], &chain, &sporks, now, 30);
        assert_eq!(sync.stage(), SyncStage::Initial);
    }

    #[test]
    fn sync_counts_average_per_peer() {
        let mut sync = SyncCoordinator::new(0);
        sync.note_count(SyncCategory::PaymentVotes, 90);
        sync.note_count(SyncCategory::PaymentVotes, 110);
        let progress = sync.progress();
        assert_eq!(progress.expected_items(SyncCategory::PaymentVotes), 100);
        assert_eq!(progress.expected_items(SyncCategory::BudgetItems), 0);
    }
}
