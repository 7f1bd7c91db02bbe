//! Volume layout: which data nodes hold which volumes, per replication policy
//!
//! Each volume id is tracked with its replica set and partitioned into the
//! writable set or the full set (never both):
//! - writable: enough live replicas for the policy and the fullest replica
//!   still below the size ceiling
//! - full: the fullest replica reached the ceiling
//!
//! A volume with too few live replicas sits in neither set until replicas come
//! back. Re-admission of a full volume is driven only by a fresh report.

use crate::common::utils::lock;
use crate::common::{Error, Result};
use crate::topology::data_node::NodeHandle;
use crate::volume::{ReplicationPolicy, VolumeId, VolumeInfo};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Replica {
    node: NodeHandle,
    /// Last size reported by this replica
    size: u64,
}

#[derive(Debug, Default)]
struct LayoutState {
    locations: HashMap<VolumeId, Vec<Replica>>,
    writables: BTreeSet<VolumeId>,
    full: BTreeSet<VolumeId>,
}

/// Result of a write placement
#[derive(Debug, Clone)]
pub struct WriteTarget {
    pub volume_id: VolumeId,
    pub count: u64,
    /// Replica set, primary first
    pub nodes: Vec<NodeHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeLayoutStatus {
    pub replication: ReplicationPolicy,
    pub writables: Vec<VolumeId>,
    pub full: Vec<VolumeId>,
    pub volumes: usize,
}

pub struct VolumeLayout {
    replication: ReplicationPolicy,
    volume_size_limit: u64,
    state: Mutex<LayoutState>,
}

impl VolumeLayout {
    pub fn new(replication: ReplicationPolicy, volume_size_limit: u64) -> Self {
        Self {
            replication,
            volume_size_limit,
            state: Mutex::new(LayoutState::default()),
        }
    }

    pub fn replication(&self) -> ReplicationPolicy {
        self.replication
    }

    pub fn volume_size_limit(&self) -> u64 {
        self.volume_size_limit
    }

    /// Record that `node` hosts a replica of `info.id`.
    ///
    /// Registering the same pair again only refreshes the reported size.
    pub fn register_volume(&self, info: &VolumeInfo, node: &NodeHandle) {
        let mut state = lock(&self.state);
        let replicas = state.locations.entry(info.id).or_default();
        match replicas.iter_mut().find(|r| r.node.id == node.id) {
            Some(replica) => {
                replica.size = info.size;
                replica.node = node.clone();
            }
            None => replicas.push(Replica {
                node: node.clone(),
                size: info.size,
            }),
        }
        self.refresh(&mut state, info.id);
    }

    /// Drop `node_id` from the replica set of `vid`
    pub fn set_volume_unavailable(&self, vid: VolumeId, node_id: &str) -> bool {
        let mut state = lock(&self.state);
        let Some(replicas) = state.locations.get_mut(&vid) else {
            return false;
        };
        let before = replicas.len();
        replicas.retain(|r| r.node.id != node_id);
        let removed = replicas.len() != before;
        if removed {
            self.refresh(&mut state, vid);
        }
        removed
    }

    /// Mark `vid` full on a report from a storage node; the volume stays full
    /// until a later report shows room again.
    pub fn set_volume_full(&self, vid: VolumeId) -> bool {
        let mut state = lock(&self.state);
        let limit = self.volume_size_limit;
        let Some(replicas) = state.locations.get_mut(&vid) else {
            return false;
        };
        for replica in replicas.iter_mut() {
            replica.size = replica.size.max(limit);
        }
        self.refresh(&mut state, vid);
        state.full.contains(&vid)
    }

    /// Re-derive writable/full membership of `vid` from its replica set
    fn refresh(&self, state: &mut LayoutState, vid: VolumeId) {
        let Some(replicas) = state.locations.get(&vid) else {
            return;
        };
        let fullest = replicas.iter().map(|r| r.size).max();
        let enough_copies = replicas.len() >= self.replication.copy_count();

        match fullest {
            Some(size) if size >= self.volume_size_limit => {
                if state.writables.remove(&vid) {
                    tracing::info!("Volume {} is full", vid);
                }
                state.full.insert(vid);
            }
            Some(_) if enough_copies => {
                state.full.remove(&vid);
                state.writables.insert(vid);
            }
            _ => {
                state.full.remove(&vid);
                if state.writables.remove(&vid) {
                    tracing::info!(
                        "Volume {} has {} of {} replicas, no longer writable",
                        vid,
                        replicas.len(),
                        self.replication.copy_count()
                    );
                }
            }
        }
    }

    /// Replica set of `vid`, or `None` if the volume is unknown here or has
    /// no live replica
    pub fn lookup(&self, vid: VolumeId) -> Option<Vec<NodeHandle>> {
        let state = lock(&self.state);
        let replicas = state.locations.get(&vid)?;
        if replicas.is_empty() {
            return None;
        }
        Some(replicas.iter().map(|r| r.node.clone()).collect())
    }

    /// Choose a writable volume for `count` new files.
    ///
    /// With a data center given, only volumes with a replica there qualify.
    /// Among the candidates the choice is random, weighted by the room left
    /// below the size ceiling.
    pub fn pick_for_write(&self, count: u64, data_center: Option<&str>) -> Result<WriteTarget> {
        let data_center = data_center.filter(|dc| !dc.is_empty());
        let state = lock(&self.state);

        let candidates: Vec<(VolumeId, u64, &Vec<Replica>)> = state
            .writables
            .iter()
            .filter_map(|vid| {
                let replicas = state.locations.get(vid)?;
                if let Some(dc) = data_center {
                    if !replicas.iter().any(|r| r.node.data_center == dc) {
                        return None;
                    }
                }
                let fullest = replicas.iter().map(|r| r.size).max()?;
                let room = self.volume_size_limit.checked_sub(fullest)?;
                (room > 0).then_some((*vid, room, replicas))
            })
            .collect();

        let (vid, _, replicas) = candidates
            .choose_weighted(&mut rand::thread_rng(), |c| c.1)
            .map_err(|_| Error::NoWritableVolumes)?;

        Ok(WriteTarget {
            volume_id: *vid,
            count,
            nodes: replicas.iter().map(|r| r.node.clone()).collect(),
        })
    }

    /// Number of writable volumes, optionally restricted to a data center
    pub fn active_volume_count(&self, data_center: Option<&str>) -> usize {
        let state = lock(&self.state);
        match data_center.filter(|dc| !dc.is_empty()) {
            None => state.writables.len(),
            Some(dc) => state
                .writables
                .iter()
                .filter(|vid| {
                    state
                        .locations
                        .get(vid)
                        .map(|rs| rs.iter().any(|r| r.node.data_center == dc))
                        .unwrap_or(false)
                })
                .count(),
        }
    }

    pub fn is_writable(&self, vid: VolumeId) -> bool {
        lock(&self.state).writables.contains(&vid)
    }

    pub fn is_full(&self, vid: VolumeId) -> bool {
        lock(&self.state).full.contains(&vid)
    }

    pub fn to_status(&self) -> VolumeLayoutStatus {
        let state = lock(&self.state);
        VolumeLayoutStatus {
            replication: self.replication,
            writables: state.writables.iter().copied().collect(),
            full: state.full.iter().copied().collect(),
            volumes: state.locations.len(),
        }
    }
}
