use obol_types::CollateralRef;
use serde::{Deserialize, Serialize};

use crate::{Broadcast, Heartbeat, PaymentVote};

/// Item categories reported during bootstrap sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncCategory {
    NodeList,
    PaymentVotes,
    BudgetItems,
    CommunityVotes,
}

/// Service-node subsystem messages carried over the peer-to-peer layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Announce(Broadcast),
    Heartbeat(Heartbeat),
    Vote(PaymentVote),
    /// Request the node list, or a single entry when a collateral is given.
    ListRequest(Option<CollateralRef>),
    /// Request recent payment votes; the count hints how many the requester
    /// expects back.
    VoteSyncRequest { count: u32 },
    /// Request current spork state.
    SporkRequest,
    /// Peer reports how many items of a category it holds, in response to a
    /// sync request.
    SyncCount { category: SyncCategory, count: u32 },
}

impl Message {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Announce(_) => "announce",
            Message::Heartbeat(_) => "heartbeat",
            Message::Vote(_) => "vote",
            Message::ListRequest(_) => "list-request",
            Message::VoteSyncRequest { .. } => "vote-sync-request",
            Message::SporkRequest => "spork-request",
            Message::SyncCount { .. } => "sync-count",
        }
    }
}
