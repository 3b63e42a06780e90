use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint file not found")]
    Missing,

    #[error("checkpoint hash mismatch, data may be corrupted")]
    HashMismatch,

    #[error("invalid checkpoint magic, unknown file format")]
    MagicMismatch,

    #[error("checkpoint belongs to a different network")]
    NetworkMismatch,

    #[error("checkpoint file truncated or malformed")]
    BadFormat,

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
