//! Protocol constants governing service-node lifecycles, elections, and
//! payment consensus.

use crate::amount::{Amount, COIN};

/// Protocol version advertised in broadcasts.
pub const PROTOCOL_VERSION: u32 = 70_912;
/// Oldest protocol version accepted while the pay-updated-nodes spork is off.
pub const MIN_PROTOCOL_BEFORE_ENFORCEMENT: u32 = 70_910;

/// Fixed collateral every service node must lock: 2 500 OBL.
pub const COLLATERAL: Amount = Amount(2_500 * COIN);
/// Confirmations the collateral output needs before a broadcast is accepted.
pub const MIN_CONFIRMATIONS: u32 = 15;

/// How often an active node emits a heartbeat.
pub const HEARTBEAT_SECONDS: u64 = 5 * 60;
/// A node stays `PreEnabled` until its heartbeat is at least this much
/// younger than its announcement.
pub const HEARTBEAT_MATURITY_SECONDS: u64 = 10 * 60;
/// Minimum spacing between accepted re-broadcasts of the same node.
pub const REBROADCAST_MIN_SECONDS: u64 = 5 * 60;
/// No heartbeat for this long: the node is `Expired`.
pub const EXPIRATION_SECONDS: u64 = 120 * 60;
/// No heartbeat for this long: the node is pruned.
pub const REMOVAL_SECONDS: u64 = 130 * 60;
/// Throttle on per-node lifecycle re-derivation.
pub const CHECK_SECONDS: u64 = 5;
/// Seen-set entries outlive the node by this much so a pruned node can be
/// re-learned from a replayed broadcast without a fresh announcement.
pub const SEEN_RETENTION_SECONDS: u64 = REMOVAL_SECONDS * 2;

/// Tolerated clock skew for gossip timestamps.
pub const FUTURE_DRIFT_SECONDS: u64 = 60 * 60;
/// Heartbeats older than this are rejected outright.
pub const HEARTBEAT_MAX_AGE_SECONDS: u64 = 60 * 60;
/// Heartbeats reference the block this many blocks behind the tip.
pub const HEARTBEAT_ANCHOR_DEPTH: u32 = 12;
/// A heartbeat anchor more than this many blocks behind the tip is stale.
pub const HEARTBEAT_ANCHOR_MAX_AGE: u32 = 24;

/// Votes required on a payee before payment enforcement kicks in.
pub const SIGNATURES_REQUIRED: u32 = 6;
/// Rank bound for producing a vote; votes from ranks beyond twice this are
/// rejected.
pub const SIGNATURES_TOTAL: u32 = 10;
/// A payee already scheduled within this many upcoming blocks is skipped by
/// the election queue.
pub const SCHEDULE_LOOKAHEAD: u32 = 8;
/// Minimum node age (seconds) for the "stable" node count, applied while
/// payment enforcement is active. Must exceed [`REMOVAL_SECONDS`] so a
/// misconfigured node cannot flap in and out of the stable set.
pub const STABLE_NODE_MIN_AGE_SECONDS: u64 = 8_000;
/// Votes are scored against the block this far behind the target height.
pub const SCORE_LOOKBACK: u32 = 100;
/// Hard floor on vote retention, in blocks.
pub const VOTE_RETENTION_MIN_BLOCKS: u32 = 1_000;
/// Votes may target at most this many blocks past the tip.
pub const VOTE_FUTURE_BLOCKS: u32 = 20;

/// Block reward at the given height. The emission schedule proper belongs
/// to the chain collaborator; this fixed value is what the subsystem uses
/// when a caller does not supply one.
pub fn block_value(_height: u32) -> Amount {
    Amount(50 * COIN)
}

/// Portion of the block reward owed to the elected service node.
///
/// The share starts at half the reward and shrinks by one percent for every
/// 25 nodes above 100, flooring at 40%, so subsidy pressure eases as the
/// network grows. `node_count` here is whichever count the caller's
/// enforcement branch selected (stable or raw) plus the network drift
/// allowance.
pub fn node_payment(_height: u32, block_value: Amount, node_count: usize) -> Amount {
    let over = (node_count.saturating_sub(100) / 25).min(10) as u64;
    let share = 50 - over;
    Amount(block_value.0 / 100 * share)
}
