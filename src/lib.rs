//! # blobmaster
//!
//! Placement and cluster-state core of a distributed blob-storage master:
//! - Node hierarchy (topology → data center → rack → data node) with
//!   aggregate capacity counters
//! - Per-replication-policy volume layouts and weighted-random write placement
//! - Volume growth across racks and data centers
//! - Durable, batched file-key sequencer
//! - Dead/recovered node processing and a liveness watchdog
//!
//! ## Architecture
//!
//! ```text
//!  heartbeats ──▶ Topology::register_volumes ──▶ NodeTree ──▶ VolumeLayout[policy]
//!                         │
//!  assign ──────▶ Topology::assign ──▶ VolumeLayout::pick_for_write
//!                         │                 └─ (no writable volume) grow_volume
//!                         └──▶ Sequencer::next_file_id ──▶ FileId
//!
//!  watchdog ──▶ dead / recovered / full channels ──▶ maintenance loop
//! ```
//!
//! ## Usage
//!
//! ```bash
//! blobmaster serve --config master.toml --topology-file topology.toml
//! blobmaster sequence --meta-dir ./master-data
//! ```

pub mod common;
pub mod sequence;
pub mod topology;
pub mod volume;

// Re-export commonly used types
pub use common::{Error, MasterConfig, Result};
pub use sequence::Sequencer;
pub use topology::{Assignment, NodeReport, Topology};
pub use volume::{FileId, ReplicationPolicy, VolumeId, VolumeInfo};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
