//! Cryptographic primitives for the service-node subsystem.
//!
//! - **Ed25519** for signing broadcasts, heartbeats, and payment votes
//! - **Blake2b** for message identity hashes and election scores

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, msg_hash};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
