use std::fs;
use std::path::{Path, PathBuf};

use obol_crypto::blake2b_256;
use obol_types::NetworkId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Trailing hash length.
const HASH_LEN: usize = 32;

/// A self-verifying checkpoint file.
///
/// Layout: ASCII magic string, 4-byte network magic, bincode payload, then
/// a blake2b hash of everything before it. The magic names the payload kind
/// so a registry checkpoint can never be read back as a vote checkpoint;
/// the network magic keeps testnet data out of a mainnet data dir.
pub struct CheckpointFile {
    path: PathBuf,
    magic: &'static str,
    network: NetworkId,
}

impl CheckpointFile {
    pub fn new(path: impl Into<PathBuf>, magic: &'static str, network: NetworkId) -> Self {
        CheckpointFile { path: path.into(), magic, network }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write<T: Serialize>(&self, payload: &T) -> Result<(), StoreError> {
        let mut body = Vec::new();
        body.extend_from_slice(self.magic.as_bytes());
        body.extend_from_slice(&self.network.magic());
        body.extend_from_slice(&bincode::serialize(payload)?);
        let hash = blake2b_256(&body);
        body.extend_from_slice(&hash);

        // Write-then-rename so a crash mid-write leaves the old file intact.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &body)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = body.len(), "checkpoint written");
        Ok(())
    }

    pub fn read<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        let magic_len = self.magic.len();
        if raw.len() < magic_len + 4 + HASH_LEN {
            return Err(StoreError::BadFormat);
        }
        let (body, stored_hash) = raw.split_at(raw.len() - HASH_LEN);
        if blake2b_256(body).as_slice() != stored_hash {
            return Err(StoreError::HashMismatch);
        }
        if &body[..magic_len] != self.magic.as_bytes() {
            return Err(StoreError::MagicMismatch);
        }
        if body[magic_len..magic_len + 4] != self.network.magic() {
            return Err(StoreError::NetworkMismatch);
        }
        Ok(bincode::deserialize(&body[magic_len + 4..])?)
    }

    /// Periodic dump: verify the existing file first and refuse to clobber
    /// one we cannot even parse the frame of, since that points at a
    /// configuration mix-up rather than corruption.
    pub fn dump<T: Serialize + DeserializeOwned>(&self, payload: &T) -> Result<(), StoreError> {
        match self.read::<T>() {
            Ok(_) | Err(StoreError::Missing) => {}
            Err(e @ (StoreError::MagicMismatch | StoreError::NetworkMismatch)) => {
                warn!(path = %self.path.display(), error = %e, "refusing to overwrite checkpoint");
                return Err(e);
            }
            Err(e) => {
                // Corrupted or stale-format data; overwriting is the fix.
                info!(path = %self.path.display(), error = %e, "replacing unreadable checkpoint");
            }
        }
        self.write(payload)
    }
}
