//! Volume identifiers and descriptors reported by storage nodes

use crate::common::{Error, Result};
use crate::volume::ReplicationPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Volume identifier
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VolumeId(pub u32);

impl VolumeId {
    /// The id minted after this one, or `None` once the id space is used up
    pub fn next(self) -> Option<VolumeId> {
        self.0.checked_add(1).map(VolumeId)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VolumeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(VolumeId)
            .map_err(|e| Error::Other(format!("invalid volume id {:?}: {}", s, e)))
    }
}

impl From<u32> for VolumeId {
    fn from(v: u32) -> Self {
        VolumeId(v)
    }
}

/// Volume descriptor as announced by a storage node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub id: VolumeId,
    /// Bytes used on the reporting replica
    pub size: u64,
    pub replication: ReplicationPolicy,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub delete_count: u64,
}

impl VolumeInfo {
    pub fn new(id: impl Into<VolumeId>, replication: ReplicationPolicy, size: u64) -> Self {
        Self {
            id: id.into(),
            size,
            replication,
            file_count: 0,
            delete_count: 0,
        }
    }
}
