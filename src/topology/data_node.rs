//! Storage node: the leaf of the hierarchy

use crate::topology::node::{NodeIdx, NodeTree};
use crate::volume::{VolumeId, VolumeInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// One physical storage server
#[derive(Debug, Clone)]
pub struct DataNode {
    pub ip: String,
    pub port: u16,
    pub public_url: String,
    /// Unix time of the last heartbeat, in seconds
    pub last_seen: u64,
    pub dead: bool,
    volumes: HashMap<VolumeId, VolumeInfo>,
}

impl DataNode {
    pub fn new(ip: impl Into<String>, port: u16, public_url: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port,
            public_url: public_url.into(),
            last_seen: 0,
            dead: false,
            volumes: HashMap::new(),
        }
    }

    /// `host:port`, also used as the node id
    pub fn url(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn match_location(&self, ip: &str, port: u16) -> bool {
        self.ip == ip && self.port == port
    }

    pub fn volumes(&self) -> impl Iterator<Item = &VolumeInfo> {
        self.volumes.values()
    }

    pub fn volume(&self, vid: VolumeId) -> Option<&VolumeInfo> {
        self.volumes.get(&vid)
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }
}

/// Cheap, detached reference to a data node, handed out by layouts and
/// placement decisions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NodeHandle {
    /// `ip:port`
    pub id: String,
    pub public_url: String,
    pub data_center: String,
    pub rack: String,
}

impl NodeHandle {
    pub fn url(&self) -> &str {
        &self.id
    }
}

/// Read-only summary for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct DataNodeStatus {
    pub url: String,
    pub public_url: String,
    pub volumes: i64,
    pub max: i64,
    pub free: i64,
    pub dead: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl NodeTree {
    /// Record a volume reported by the data node at `idx`.
    ///
    /// A new volume bumps the volume counters and the running maximum id on
    /// every ancestor; a known one is refreshed in place. Returns whether the
    /// volume was new.
    pub fn add_or_update_volume(&mut self, idx: NodeIdx, info: VolumeInfo) -> bool {
        let vid = info.id;
        let Some(dn) = self.data_node_mut(idx) else {
            return false;
        };

        let is_new = dn.volumes.insert(vid, info).is_none();
        if is_new {
            let active = if dn.dead { 0 } else { 1 };
            self.up_adjust_volume_count(idx, 1);
            self.up_adjust_active_volume_count(idx, active);
            self.up_adjust_max_volume_id(idx, vid);
        }
        is_new
    }

    /// Forget a volume the data node no longer reports
    pub fn remove_volume(&mut self, idx: NodeIdx, vid: VolumeId) -> Option<VolumeInfo> {
        let dn = self.data_node_mut(idx)?;
        let removed = dn.volumes.remove(&vid)?;
        let active = if dn.dead { 0 } else { -1 };
        self.up_adjust_volume_count(idx, -1);
        self.up_adjust_active_volume_count(idx, active);
        Some(removed)
    }

    /// Handle for the data node at `idx`
    pub fn node_handle(&self, idx: NodeIdx) -> Option<NodeHandle> {
        let dn = self.data_node(idx)?;
        Some(NodeHandle {
            id: dn.url(),
            public_url: dn.public_url.clone(),
            rack: self.ancestor_id(idx, 1)?.to_string(),
            data_center: self.ancestor_id(idx, 2)?.to_string(),
        })
    }

    pub fn data_node_status(&self, idx: NodeIdx) -> Option<DataNodeStatus> {
        let dn = self.data_node(idx)?;
        let counters = self.counters(idx);
        Some(DataNodeStatus {
            url: dn.url(),
            public_url: dn.public_url.clone(),
            volumes: counters.volume_count,
            max: counters.max_volume_count,
            free: counters.free_space(),
            dead: dn.dead,
            last_seen: DateTime::from_timestamp(dn.last_seen as i64, 0),
        })
    }
}
