//! Local service-node activation: turning this process into an announced,
//! heartbeating service node once the wallet, chain, and network
//! preconditions hold.

mod controller;
mod wallet;

pub use controller::{ActivationController, ActivationState};
pub use wallet::{Connector, MemoryWallet, StaticConnector, Wallet};
