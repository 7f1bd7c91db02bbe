//! Error types for blobmaster

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Capacity Errors ===
    #[error("No writable volumes available")]
    NoWritableVolumes,

    #[error("No free space left in {0}")]
    NoFreeSpace(String),

    #[error("Allocation of volume {volume_id} failed on {node}: {reason}")]
    AllocationFailed {
        node: String,
        volume_id: u32,
        reason: String,
    },

    // === Sequencer Errors ===
    #[error("Failed to persist sequence: {0}")]
    SequencePersist(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    // === Topology Errors ===
    #[error("Data node not found: {0}")]
    NodeNotFound(String),

    // === Parse Errors ===
    #[error("Invalid replication policy: {0}")]
    InvalidReplication(String),

    #[error("Invalid file id: {0}")]
    InvalidFileId(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Can the caller grow capacity and try again?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NoWritableVolumes | Error::NoFreeSpace(_) | Error::AllocationFailed { .. }
        )
    }

    /// Capacity exhaustion, as opposed to an internal fault.
    pub fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Error::NoWritableVolumes | Error::NoFreeSpace(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(feature = "rocksdb-sequence")]
impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::SequencePersist(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
