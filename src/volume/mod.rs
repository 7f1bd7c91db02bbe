//! Volume-side value types shared with storage nodes
//!
//! - Volume ids and the descriptors nodes report in heartbeats
//! - Replication policies
//! - File ids handed to clients

pub mod file_id;
pub mod info;
pub mod replication;

pub use file_id::FileId;
pub use info::{VolumeId, VolumeInfo};
pub use replication::ReplicationPolicy;
