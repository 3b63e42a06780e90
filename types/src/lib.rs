//! Fundamental types shared across the Obol service-node subsystem.
//!
//! Everything here is plain data: hashes, the collateral outpoint that
//! identifies a service node, monetary amounts, payee scripts, and the
//! protocol constants that govern node lifecycles and payment consensus.

pub mod address;
pub mod amount;
pub mod hash;
pub mod keys;
pub mod network;
pub mod outpoint;
pub mod params;
pub mod script;
pub mod tx;

pub use address::NodeAddress;
pub use amount::{Amount, COIN};
pub use hash::{BlockHash, MsgHash, TxId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use outpoint::CollateralRef;
pub use script::PayeeScript;
pub use tx::{BlockTransaction, TxOutput};
