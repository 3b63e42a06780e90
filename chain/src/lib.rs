//! Read-only view of the host blockchain, plus the spork oracle.
//!
//! The service-node subsystem never validates blocks itself. Everything it
//! needs from consensus comes through [`ChainView`]: the current tip, block
//! hashes by height, block timestamps, and collateral lookups. Production
//! nodes back this with the real chain state; tests use [`MemoryChain`].

mod memory;
mod spork;
mod view;

pub use memory::MemoryChain;
pub use spork::{SporkId, SporkSet};
pub use view::{ChainView, CollateralStatus};
