//! Replication policies
//!
//! A policy is written as two digits `XY`:
//! - `X`: extra copies placed in other data centers
//! - `Y`: extra copies placed on other racks of the same data center

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReplicationPolicy {
    /// `00`: a single copy
    #[default]
    Single,
    /// `01`: two copies on different racks of one data center
    DiffRack,
    /// `10`: two copies in different data centers
    DiffDataCenter,
    /// `20`: three copies in three data centers
    TwoDataCenters,
    /// `11`: three copies, one on another rack and one in another data center
    DiffRackAndDataCenter,
}

impl ReplicationPolicy {
    /// Number of layout slots, one per policy
    pub const COUNT: usize = 5;

    pub const ALL: [ReplicationPolicy; Self::COUNT] = [
        ReplicationPolicy::Single,
        ReplicationPolicy::DiffRack,
        ReplicationPolicy::DiffDataCenter,
        ReplicationPolicy::TwoDataCenters,
        ReplicationPolicy::DiffRackAndDataCenter,
    ];

    /// Stable slot index used to select a volume layout
    pub fn index(&self) -> usize {
        match self {
            ReplicationPolicy::Single => 0,
            ReplicationPolicy::DiffRack => 1,
            ReplicationPolicy::DiffDataCenter => 2,
            ReplicationPolicy::TwoDataCenters => 3,
            ReplicationPolicy::DiffRackAndDataCenter => 4,
        }
    }

    /// Extra copies required in other data centers
    pub fn diff_data_center_count(&self) -> usize {
        match self {
            ReplicationPolicy::Single | ReplicationPolicy::DiffRack => 0,
            ReplicationPolicy::DiffDataCenter | ReplicationPolicy::DiffRackAndDataCenter => 1,
            ReplicationPolicy::TwoDataCenters => 2,
        }
    }

    /// Extra copies required on other racks of the primary's data center
    pub fn diff_rack_count(&self) -> usize {
        match self {
            ReplicationPolicy::DiffRack | ReplicationPolicy::DiffRackAndDataCenter => 1,
            _ => 0,
        }
    }

    /// Total number of replicas a volume of this policy must have
    pub fn copy_count(&self) -> usize {
        1 + self.diff_data_center_count() + self.diff_rack_count()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationPolicy::Single => "00",
            ReplicationPolicy::DiffRack => "01",
            ReplicationPolicy::DiffDataCenter => "10",
            ReplicationPolicy::TwoDataCenters => "20",
            ReplicationPolicy::DiffRackAndDataCenter => "11",
        }
    }
}

impl fmt::Display for ReplicationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "00" | "" => Ok(ReplicationPolicy::Single),
            "01" => Ok(ReplicationPolicy::DiffRack),
            "10" => Ok(ReplicationPolicy::DiffDataCenter),
            "20" => Ok(ReplicationPolicy::TwoDataCenters),
            "11" => Ok(ReplicationPolicy::DiffRackAndDataCenter),
            other => Err(Error::InvalidReplication(other.to_string())),
        }
    }
}

impl TryFrom<String> for ReplicationPolicy {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ReplicationPolicy> for String {
    fn from(p: ReplicationPolicy) -> Self {
        p.as_str().to_string()
    }
}
