//! Service-node registry: the set of collateral-backed nodes this peer
//! believes exist, fed by gossip and pruned by lifecycle checks, plus the
//! deterministic election engine that ranks nodes per block.

mod election;
mod identity;
mod registry;
mod snapshot;

pub use election::{calculate_score, NoSchedule, PaymentSchedule, Score};
pub use identity::{NodeIdentity, NodeState};
pub use registry::{GossipOutcome, Registry};
pub use snapshot::RegistrySnapshot;
