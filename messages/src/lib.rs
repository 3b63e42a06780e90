//! Wire payloads exchanged by the service-node subsystem.
//!
//! Three signed payloads travel over gossip: the [`Broadcast`] a node sends
//! to announce itself, the [`Heartbeat`] it sends every few minutes to prove
//! liveness, and the [`PaymentVote`] cast by elected nodes for each block.
//! Each payload carries its own canonical signing message and a stable
//! identity hash used for relay dedup.

mod broadcast;
mod heartbeat;
mod message;
mod peer;
mod vote;

pub use broadcast::Broadcast;
pub use heartbeat::Heartbeat;
pub use message::{Message, SyncCategory};
pub use peer::{Peer, QueuedPeer};
pub use vote::PaymentVote;
