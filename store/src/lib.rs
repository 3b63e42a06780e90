//! Self-verifying checkpoint files for registry and payment-vote state.

mod checkpoint;
mod error;

pub use checkpoint::CheckpointFile;
pub use error::StoreError;

/// Magic string for the service-node registry checkpoint.
pub const NODE_CACHE_MAGIC: &str = "ObolNodeCache";
/// Magic string for the payment-vote checkpoint.
pub const VOTE_CACHE_MAGIC: &str = "ObolVoteCache";
