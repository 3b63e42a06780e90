//! Staged bootstrap synchronization: sporks, then the node list, then
//! payment votes, then the budget and community-vote subsystems, with
//! failure backoff and stale-chain detection.

mod coordinator;
mod stage;

pub use coordinator::{
    SyncCoordinator, SyncProgress, CHAIN_STALENESS_SECONDS, FAILURE_BACKOFF_SECONDS,
    PEER_ATTEMPT_THRESHOLD, STAGE_TIMEOUT_SECONDS,
};
pub use stage::SyncStage;
