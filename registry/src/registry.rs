use std::collections::{BTreeMap, HashMap};

use obol_chain::{ChainView, CollateralStatus};
use obol_messages::{Broadcast, Heartbeat, Message, Peer, SyncCategory};
use obol_types::params::{
    CHECK_SECONDS, FUTURE_DRIFT_SECONDS, HEARTBEAT_ANCHOR_MAX_AGE, HEARTBEAT_MAX_AGE_SECONDS,
    MIN_PROTOCOL_BEFORE_ENFORCEMENT, REBROADCAST_MIN_SECONDS, SEEN_RETENTION_SECONDS,
    STABLE_NODE_MIN_AGE_SECONDS,
};
use obol_types::{CollateralRef, MsgHash, NetworkId, PayeeScript, PublicKey};
use rand::seq::IteratorRandom;
use tracing::{debug, info, warn};

use crate::identity::{NodeIdentity, NodeState};

/// Result of feeding a gossip payload into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipOutcome {
    /// Valid and new; the caller should relay it.
    Accepted,
    /// Valid but already known or stale; drop silently.
    Ignored,
    /// Invalid; the sending peer earns the given misbehavior score.
    Rejected { dos_score: u32 },
    /// Heartbeat for a node we have never heard of; the caller should ask
    /// the sender for the matching announcement.
    UnknownNode,
}

impl GossipOutcome {
    pub fn should_relay(&self) -> bool {
        matches!(self, GossipOutcome::Accepted)
    }
}

/// How long peers are held to their list-request throttle.
const LIST_REQUEST_THROTTLE_SECONDS: u64 = 3 * 60 * 60;

/// All service nodes known to this peer, with gossip dedup and request
/// throttling state.
pub struct Registry {
    network: NetworkId,
    nodes: BTreeMap<CollateralRef, NodeIdentity>,
    seen_broadcasts: HashMap<MsgHash, u64>,
    seen_heartbeats: HashMap<MsgHash, u64>,
    /// Peers we asked for the full list, and when the ask expires.
    we_asked_list: HashMap<u64, u64>,
    /// Peers that asked us for the full list.
    they_asked_list: HashMap<u64, u64>,
    /// Entries we asked peers about.
    we_asked_entry: HashMap<CollateralRef, u64>,
}

impl Registry {
    pub fn new(network: NetworkId) -> Self {
        Registry {
            network,
            nodes: BTreeMap::new(),
            seen_broadcasts: HashMap::new(),
            seen_heartbeats: HashMap::new(),
            we_asked_list: HashMap::new(),
            they_asked_list: HashMap::new(),
            we_asked_entry: HashMap::new(),
        }
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, collateral: &CollateralRef) -> Option<&NodeIdentity> {
        self.nodes.get(collateral)
    }

    pub fn find_mut(&mut self, collateral: &CollateralRef) -> Option<&mut NodeIdentity> {
        self.nodes.get_mut(collateral)
    }

    pub fn find_by_operator_key(&self, key: &PublicKey) -> Option<&NodeIdentity> {
        self.nodes.values().find(|n| &n.operator_pubkey == key)
    }

    pub fn find_by_payee(&self, payee: &PayeeScript) -> Option<&NodeIdentity> {
        self.nodes.values().find(|n| n.payee() == *payee)
    }

    pub fn find_by_collateral_key(&self, key: &PublicKey) -> Option<&NodeIdentity> {
        self.nodes.values().find(|n| &n.collateral_pubkey == key)
    }

    /// Iterate nodes in collateral order (deterministic across peers).
    pub fn iter(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NodeIdentity> {
        self.nodes.values_mut()
    }

    /// Insert a node built outside gossip (bootstrap restore, tests).
    pub fn add(&mut self, node: NodeIdentity) -> bool {
        if self.nodes.contains_key(&node.collateral) {
            return false;
        }
        debug!(node = %node.collateral, addr = %node.address, "registering service node");
        self.nodes.insert(node.collateral, node);
        true
    }

    pub fn remove(&mut self, collateral: &CollateralRef) -> Option<NodeIdentity> {
        self.nodes.remove(collateral)
    }

    /// Enabled nodes at or above the given protocol version.
    pub fn count_enabled(&self, min_protocol: Option<u32>) -> usize {
        let min = min_protocol.unwrap_or(MIN_PROTOCOL_BEFORE_ENFORCEMENT);
        self.nodes
            .values()
            .filter(|n| n.is_enabled() && n.protocol_version >= min)
            .count()
    }

    /// Enabled, protocol-current nodes that have been announced long enough
    /// to be counted on. Young nodes churn; consensus thresholds that divide
    /// by network size use this count instead of the raw one.
    pub fn stable_size(&self, now: u64) -> usize {
        self.nodes
            .values()
            .filter(|n| {
                n.is_enabled()
                    && n.protocol_version >= MIN_PROTOCOL_BEFORE_ENFORCEMENT
                    && n.announce_age(now) >= STABLE_NODE_MIN_AGE_SECONDS
            })
            .count()
    }

    /// (ipv4, ipv6) split of registered nodes.
    pub fn count_by_address_family(&self) -> (usize, usize) {
        let v4 = self.nodes.values().filter(|n| n.address.0.is_ipv4()).count();
        (v4, self.nodes.len() - v4)
    }

    /// Random enabled node outside the exclusion set.
    pub fn find_random_excluding(&self, exclude: &[CollateralRef]) -> Option<&NodeIdentity> {
        self.nodes
            .values()
            .filter(|n| n.is_enabled() && !exclude.contains(&n.collateral))
            .choose(&mut rand::rng())
    }

    fn is_port_valid(&self, port: u16) -> bool {
        match self.network {
            NetworkId::Main => port == NetworkId::Main.default_port(),
            _ => port != NetworkId::Main.default_port(),
        }
    }

    /// Validate an announcement against everything but the collateral, which
    /// needs chain access.
    fn check_broadcast(&self, bcast: &Broadcast, now: u64) -> Result<(), GossipOutcome> {
        if bcast.sig_time > now + FUTURE_DRIFT_SECONDS {
            warn!(node = %bcast.collateral, "announcement signed in the future");
            return Err(GossipOutcome::Rejected { dos_score: 1 });
        }
        if bcast.protocol_version < MIN_PROTOCOL_BEFORE_ENFORCEMENT {
            return Err(GossipOutcome::Rejected { dos_score: 0 });
        }
        if !bcast.verify() {
            warn!(node = %bcast.collateral, "bad announcement signature");
            return Err(GossipOutcome::Rejected { dos_score: 100 });
        }
        if !self.is_port_valid(bcast.address.port()) {
            return Err(GossipOutcome::Rejected { dos_score: 0 });
        }
        if bcast.address.is_local() && !self.network.allows_local_addresses() {
            return Err(GossipOutcome::Rejected { dos_score: 0 });
        }
        if let Some(hb) = &bcast.last_heartbeat {
            if hb.collateral != bcast.collateral || !hb.verify(&bcast.operator_pubkey) {
                return Err(GossipOutcome::Rejected { dos_score: 33 });
            }
            if now.saturating_sub(hb.sig_time) > HEARTBEAT_MAX_AGE_SECONDS {
                // Too old to prove liveness; the announcement itself is fine.
                debug!(node = %bcast.collateral, "discarding stale embedded heartbeat");
            }
        }
        Ok(())
    }

    /// Process a gossiped announcement.
    pub fn ingest_broadcast(
        &mut self,
        bcast: &Broadcast,
        chain: &dyn ChainView,
        now: u64,
    ) -> GossipOutcome {
        let hash = bcast.identity_hash();
        if self.seen_broadcasts.contains_key(&hash) {
            return GossipOutcome::Ignored;
        }

        if let Err(outcome) = self.check_broadcast(bcast, now) {
            return outcome;
        }

        // Collateral must exist, be unspent, hold the exact bond, and be
        // buried deep enough.
        match chain.collateral_status(&bcast.collateral) {
            CollateralStatus::Unknown => {
                // Possibly not synced far enough; no penalty, no accept.
                return GossipOutcome::Rejected { dos_score: 0 };
            }
            CollateralStatus::Spent => {
                return GossipOutcome::Rejected { dos_score: 33 };
            }
            status @ CollateralStatus::Unspent { .. } => {
                if !status.is_valid_collateral(
                    obol_types::params::COLLATERAL,
                    obol_types::params::MIN_CONFIRMATIONS,
                ) {
                    return GossipOutcome::Rejected { dos_score: 33 };
                }
                // A fresh announcement cannot predate the block where the
                // bond reached its confirmation floor.
                if !self.nodes.contains_key(&bcast.collateral) {
                    if let CollateralStatus::Unspent { confirmations, .. } = status {
                        if let Some(threshold_time) = chain.tip_height().and_then(|tip| {
                            chain.block_time(
                                (tip + obol_types::params::MIN_CONFIRMATIONS)
                                    .saturating_sub(confirmations),
                            )
                        }) {
                            if bcast.sig_time < threshold_time {
                                debug!(
                                    node = %bcast.collateral,
                                    "announcement older than its collateral maturity"
                                );
                                return GossipOutcome::Rejected { dos_score: 0 };
                            }
                        }
                    }
                }
            }
        }

        self.seen_broadcasts.insert(hash, now);

        match self.nodes.get_mut(&bcast.collateral) {
            Some(existing) => {
                // Only a strictly newer announcement from the same keys may
                // replace the entry, and not more often than the
                // rebroadcast floor.
                if bcast.collateral_pubkey != existing.collateral_pubkey {
                    return GossipOutcome::Rejected { dos_score: 33 };
                }
                if bcast.sig_time <= existing.sig_time
                    || bcast.sig_time < existing.sig_time + REBROADCAST_MIN_SECONDS
                {
                    return GossipOutcome::Ignored;
                }
                info!(node = %bcast.collateral, "updating service node from re-announcement");
                *existing = NodeIdentity::from_broadcast(bcast);
                existing.check(now, chain, CHECK_SECONDS, true);
                GossipOutcome::Accepted
            }
            None => {
                let mut node = NodeIdentity::from_broadcast(bcast);
                node.check(now, chain, CHECK_SECONDS, true);
                info!(node = %bcast.collateral, addr = %bcast.address, "new service node");
                self.nodes.insert(bcast.collateral, node);
                self.we_asked_entry.remove(&bcast.collateral);
                GossipOutcome::Accepted
            }
        }
    }

    /// Process a gossiped heartbeat.
    pub fn ingest_heartbeat(
        &mut self,
        hb: &Heartbeat,
        chain: &dyn ChainView,
        now: u64,
    ) -> GossipOutcome {
        let hash = hb.identity_hash();
        if self.seen_heartbeats.contains_key(&hash) {
            return GossipOutcome::Ignored;
        }
        if hb.sig_time > now + FUTURE_DRIFT_SECONDS {
            return GossipOutcome::Rejected { dos_score: 1 };
        }
        if now.saturating_sub(hb.sig_time) > HEARTBEAT_MAX_AGE_SECONDS {
            return GossipOutcome::Rejected { dos_score: 1 };
        }

        let Some(node) = self.nodes.get_mut(&hb.collateral) else {
            return GossipOutcome::UnknownNode;
        };

        if !hb.verify(&node.operator_pubkey) {
            return GossipOutcome::Rejected { dos_score: 33 };
        }

        // The anchor pins the sender to our chain. An unknown anchor most
        // likely means a fork, not malice.
        match chain.height_of(&hb.anchor_hash) {
            None => {
                debug!(node = %hb.collateral, "heartbeat anchored to unknown block");
                return GossipOutcome::Ignored;
            }
            Some(anchor_height) => {
                let tip = chain.tip_height().unwrap_or(0);
                if tip.saturating_sub(anchor_height) > HEARTBEAT_ANCHOR_MAX_AGE {
                    return GossipOutcome::Rejected { dos_score: 33 };
                }
            }
        }

        if !node.update_heartbeat(hb) {
            return GossipOutcome::Ignored;
        }
        node.check(now, chain, CHECK_SECONDS, true);
        self.seen_heartbeats.insert(hash, now);
        debug!(node = %hb.collateral, "heartbeat accepted");
        GossipOutcome::Accepted
    }

    /// Re-derive every node's lifecycle state.
    pub fn check_all(&mut self, now: u64, chain: &dyn ChainView) {
        for node in self.nodes.values_mut() {
            node.check(now, chain, CHECK_SECONDS, false);
        }
    }

    /// Re-check all nodes and drop the ones past the end of their lifecycle,
    /// along with expired dedup and throttle entries.
    pub fn check_and_prune(&mut self, now: u64, chain: &dyn ChainView, force: bool) {
        for node in self.nodes.values_mut() {
            node.check(now, chain, CHECK_SECONDS, force);
        }
        let before = self.nodes.len();
        self.nodes.retain(|_, n| {
            !matches!(n.state, NodeState::Remove | NodeState::CollateralSpent)
        });
        let dropped = before - self.nodes.len();
        if dropped > 0 {
            info!(dropped, remaining = self.nodes.len(), "pruned service nodes");
        }

        self.seen_broadcasts
            .retain(|_, seen_at| now.saturating_sub(*seen_at) < SEEN_RETENTION_SECONDS);
        self.seen_heartbeats
            .retain(|_, seen_at| now.saturating_sub(*seen_at) < SEEN_RETENTION_SECONDS);
        self.we_asked_list.retain(|_, until| *until > now);
        self.they_asked_list.retain(|_, until| *until > now);
        self.we_asked_entry.retain(|_, until| *until > now);
    }

    /// Whether to send a full-list request to this peer, recording the ask.
    pub fn should_request_list(&mut self, peer_id: u64, now: u64) -> bool {
        if self.we_asked_list.get(&peer_id).is_some_and(|&until| until > now) {
            return false;
        }
        self.we_asked_list
            .insert(peer_id, now + LIST_REQUEST_THROTTLE_SECONDS);
        true
    }

    /// Record that we asked a peer for a single entry; returns false when a
    /// recent ask is still outstanding.
    pub fn should_request_entry(&mut self, collateral: &CollateralRef, now: u64) -> bool {
        if self.we_asked_entry.get(collateral).is_some_and(|&until| until > now) {
            return false;
        }
        self.we_asked_entry
            .insert(*collateral, now + LIST_REQUEST_THROTTLE_SECONDS);
        true
    }

    /// Serve a list request. Full-list requests are throttled per peer;
    /// abusers earn misbehavior. Single-entry requests are never throttled.
    pub fn serve_list(&mut self, peer: &dyn Peer, requested: Option<CollateralRef>, now: u64) {
        if requested.is_none() {
            if self
                .they_asked_list
                .get(&peer.id())
                .is_some_and(|&until| until > now)
            {
                warn!(peer = peer.id(), "peer re-requested full node list too soon");
                peer.misbehaving(34);
                return;
            }
            self.they_asked_list
                .insert(peer.id(), now + LIST_REQUEST_THROTTLE_SECONDS);
        }

        let mut sent = 0u32;
        for node in self.nodes.values() {
            if node.address.is_local() && !self.network.allows_local_addresses() {
                continue;
            }
            if matches!(node.state, NodeState::Remove | NodeState::CollateralSpent) {
                continue;
            }
            match requested {
                Some(wanted) if wanted != node.collateral => continue,
                _ => {}
            }
            peer.send(Message::Announce(node.to_broadcast()));
            sent += 1;
            if requested.is_some() {
                break;
            }
        }
        if requested.is_none() {
            peer.send(Message::SyncCount { category: SyncCategory::NodeList, count: sent });
            debug!(peer = peer.id(), sent, "served node list");
        }
    }
}
