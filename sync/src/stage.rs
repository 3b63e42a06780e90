use serde::{Deserialize, Serialize};

/// Stages of bootstrap synchronization, walked in order. `Failed` sits
/// outside the ladder; a failed sync restarts from `Initial` after a
/// backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStage {
    Initial,
    Sporks,
    NodeList,
    PaymentVotes,
    Budget,
    CommunityVote,
    Finished,
    Failed,
}

impl SyncStage {
    pub fn next(self) -> SyncStage {
        match self {
            SyncStage::Initial => SyncStage::Sporks,
            SyncStage::Sporks => SyncStage::NodeList,
            SyncStage::NodeList => SyncStage::PaymentVotes,
            SyncStage::PaymentVotes => SyncStage::Budget,
            SyncStage::Budget => SyncStage::CommunityVote,
            SyncStage::CommunityVote => SyncStage::Finished,
            SyncStage::Finished => SyncStage::Finished,
            SyncStage::Failed => SyncStage::Failed,
        }
    }

    /// User-facing status line for RPC and logs.
    pub fn status(self) -> &'static str {
        match self {
            SyncStage::Initial => "Synchronization pending...",
            SyncStage::Sporks => "Synchronizing sporks...",
            SyncStage::NodeList => "Synchronizing service node list...",
            SyncStage::PaymentVotes => "Synchronizing service node payments...",
            SyncStage::Budget => "Synchronizing budgets...",
            SyncStage::CommunityVote => "Synchronizing community votes...",
            SyncStage::Finished => "Synchronization finished",
            SyncStage::Failed => "Synchronization failed",
        }
    }
}
