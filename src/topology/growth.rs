//! Volume growth
//!
//! When a layout has no writable volume left, a fresh volume id is minted and
//! created on a set of storage nodes that satisfies the replication spread.
//! Nodes are chosen at random, weighted by their free volume slots:
//! 1. a main data center, then a main rack and node inside it
//! 2. one node on each of `diff_rack_count` other racks of the main data center
//! 3. one node in each of `diff_data_center_count` other data centers

use crate::common::{Error, Result, METRICS};
use crate::topology::data_node::NodeHandle;
use crate::topology::node::NodeTree;
use crate::topology::topology::{Assignment, Topology};
use crate::volume::{ReplicationPolicy, VolumeId, VolumeInfo};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Creates volumes on storage nodes
pub trait VolumeAllocator: Send + Sync {
    fn allocate(
        &self,
        node: &NodeHandle,
        volume_id: VolumeId,
        policy: ReplicationPolicy,
    ) -> Result<()>;
}

struct RackSlots {
    nodes: Vec<(NodeHandle, u64)>,
}

impl RackSlots {
    fn free(&self) -> u64 {
        self.nodes.iter().map(|(_, free)| free).sum()
    }
}

struct DataCenterSlots {
    name: String,
    racks: Vec<RackSlots>,
}

impl DataCenterSlots {
    fn free(&self) -> u64 {
        self.racks.iter().map(RackSlots::free).sum()
    }
}

/// Live nodes with free slots, grouped by data center and rack. Empty racks
/// and data centers are left out.
fn free_slots(tree: &NodeTree) -> Vec<DataCenterSlots> {
    let root = tree.root();
    tree.children(root)
        .filter_map(|dc| {
            let racks: Vec<RackSlots> = tree
                .children(dc)
                .filter_map(|rack| {
                    let nodes: Vec<(NodeHandle, u64)> = tree
                        .children(rack)
                        .filter(|idx| tree.data_node(*idx).map(|dn| !dn.dead).unwrap_or(false))
                        .filter_map(|idx| {
                            let free = tree.free_space(idx);
                            if free <= 0 {
                                return None;
                            }
                            Some((tree.node_handle(idx)?, free as u64))
                        })
                        .collect();
                    (!nodes.is_empty()).then_some(RackSlots { nodes })
                })
                .collect();
            (!racks.is_empty()).then(|| DataCenterSlots {
                name: tree[dc].id.clone(),
                racks,
            })
        })
        .collect()
}

/// Remove and return one item, chosen with probability proportional to its
/// weight
fn take_weighted<T, R: Rng>(
    items: &mut Vec<T>,
    weight: impl Fn(&T) -> u64,
    rng: &mut R,
) -> Option<T> {
    let dist = WeightedIndex::new(items.iter().map(&weight)).ok()?;
    let i = dist.sample(rng);
    Some(items.swap_remove(i))
}

fn take_node<R: Rng>(mut rack: RackSlots, rng: &mut R) -> Option<NodeHandle> {
    take_weighted(&mut rack.nodes, |(_, free)| *free, rng).map(|(node, _)| node)
}

/// Choose the replica set for a new volume of `policy`
pub(crate) fn select_nodes<R: Rng>(
    tree: &NodeTree,
    policy: ReplicationPolicy,
    data_center: Option<&str>,
    rng: &mut R,
) -> Result<Vec<NodeHandle>> {
    let no_room = || {
        Error::NoFreeSpace(format!(
            "no placement for replication {} in {}",
            policy,
            data_center.unwrap_or("any data center")
        ))
    };
    let diff_rack = policy.diff_rack_count();
    let diff_dc = policy.diff_data_center_count();

    let mut dcs = free_slots(tree);
    if dcs.len() < 1 + diff_dc {
        return Err(no_room());
    }

    let mut mains: Vec<DataCenterSlots> = Vec::new();
    let mut others: Vec<DataCenterSlots> = Vec::new();
    for dc in dcs.drain(..) {
        let allowed = data_center.map(|name| dc.name == name).unwrap_or(true);
        if allowed && dc.racks.len() > diff_rack {
            mains.push(dc);
        } else {
            others.push(dc);
        }
    }

    let mut main = take_weighted(&mut mains, DataCenterSlots::free, rng).ok_or_else(no_room)?;
    others.extend(mains);
    if others.len() < diff_dc {
        return Err(no_room());
    }

    let mut picked = Vec::with_capacity(policy.copy_count());
    for _ in 0..=diff_rack {
        let rack = take_weighted(&mut main.racks, RackSlots::free, rng).ok_or_else(no_room)?;
        picked.push(take_node(rack, rng).ok_or_else(no_room)?);
    }
    for _ in 0..diff_dc {
        let mut dc = take_weighted(&mut others, DataCenterSlots::free, rng).ok_or_else(no_room)?;
        let rack = take_weighted(&mut dc.racks, RackSlots::free, rng).ok_or_else(no_room)?;
        picked.push(take_node(rack, rng).ok_or_else(no_room)?);
    }
    Ok(picked)
}

impl Topology {
    /// Create one new volume of `policy`, optionally anchored in
    /// `data_center`, and register it on its replicas.
    ///
    /// No lock is held while the allocator runs.
    pub fn grow_volume(
        &self,
        policy: ReplicationPolicy,
        data_center: Option<&str>,
    ) -> Result<VolumeId> {
        let allocator = self
            .allocator()
            .cloned()
            .ok_or_else(|| Error::InvalidConfig("no volume allocator installed".into()))?;
        let data_center = data_center.filter(|dc| !dc.is_empty());

        let nodes = self.with_tree(|tree| {
            select_nodes(tree, policy, data_center, &mut rand::thread_rng())
        })?;
        let vid = self.next_volume_id()?;

        for node in &nodes {
            allocator
                .allocate(node, vid, policy)
                .map_err(|e| Error::AllocationFailed {
                    node: node.id.clone(),
                    volume_id: vid.0,
                    reason: e.to_string(),
                })?;
        }

        let info = VolumeInfo::new(vid, policy, 0);
        let layout = self.get_volume_layout(policy);
        let mut tree = self.tree_mut();
        for node in &nodes {
            match tree.data_node_index(&node.id) {
                Some(idx) => {
                    tree.add_or_update_volume(idx, info.clone());
                    // a node declared dead meanwhile joins the layout on recovery
                    if tree.data_node(idx).map(|dn| dn.dead).unwrap_or(true) {
                        tracing::warn!(
                            "Data node {} died while volume {} was allocated",
                            node.id,
                            vid
                        );
                    } else {
                        layout.register_volume(&info, node);
                    }
                }
                None => tracing::warn!(
                    "Data node {} left before volume {} was registered",
                    node.id,
                    vid
                ),
            }
        }
        drop(tree);

        METRICS.volumes_grown.inc();
        tracing::info!(
            "Grew volume {} ({}) on {}",
            vid,
            policy,
            nodes
                .iter()
                .map(|n| n.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(vid)
    }

    /// Place a write, growing the layout once if it has no writable volume
    pub fn assign(
        &self,
        policy: ReplicationPolicy,
        count: u64,
        data_center: Option<&str>,
    ) -> Result<Assignment> {
        METRICS.assign_requests.inc();
        let result = match self.pick_for_write(policy, count, data_center) {
            Err(Error::NoWritableVolumes) if self.allocator().is_some() => {
                tracing::debug!("No writable volume for replication {}, growing", policy);
                self.grow_volume(policy, data_center)
                    .and_then(|_| self.pick_for_write(policy, count, data_center))
            }
            other => other,
        };
        if let Err(e) = &result {
            METRICS.assign_failures.inc();
            tracing::debug!("Assign failed: {}", e);
        }
        result
    }
}
