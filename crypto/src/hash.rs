//! Blake2b hashing for message identities and election scores.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use obol_types::MsgHash;

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Identity hash of a gossip message from its canonical parts.
pub fn msg_hash(parts: &[&[u8]]) -> MsgHash {
    MsgHash::new(blake2b_256_multi(parts))
}
