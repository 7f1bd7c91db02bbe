//! Cluster topology
//!
//! - Node hierarchy: topology → data center → rack → data node
//! - Volume layouts, one per replication policy
//! - Volume growth and write placement
//! - Node health processing

pub mod configuration;
pub mod data_center;
pub mod data_node;
pub mod growth;
pub mod health;
pub mod node;
#[allow(clippy::module_inception)]
pub mod topology;
pub mod volume_layout;

pub use configuration::{Configuration, DEFAULT_DATA_CENTER, DEFAULT_RACK};
pub use data_center::{DataCenterStatus, RackStatus};
pub use data_node::{DataNode, DataNodeStatus, NodeHandle};
pub use growth::VolumeAllocator;
pub use health::{
    run_maintenance, spawn_liveness_watchdog, spawn_maintenance, FullVolume, HealthReceivers,
    STALE_PULSES,
};
pub use node::{NodeCounters, NodeIdx, NodeKind, NodeTree, TreeNode};
pub use topology::{Assignment, NodeReport, Topology, TopologyStatus};
pub use volume_layout::{VolumeLayout, VolumeLayoutStatus, WriteTarget};
