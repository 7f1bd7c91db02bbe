//! Topology: root of the node hierarchy and entry point of the master core
//!
//! Owns the node tree, one volume layout per replication policy (created on
//! first use), the sequencer, the rack/data center resolver and the health
//! channels. Lock order is always tree first, then a layout.

use crate::common::utils::{lock, read, write};
use crate::common::{timestamp_now, Error, MasterConfig, Result, METRICS};
use crate::sequence::{FileSequenceStore, Sequencer};
use crate::topology::configuration::Configuration;
use crate::topology::data_center::DataCenterStatus;
use crate::topology::data_node::NodeHandle;
use crate::topology::growth::VolumeAllocator;
use crate::topology::health::{health_channels, FullVolume, HealthReceivers, HealthSenders};
use crate::topology::node::{NodeIdx, NodeTree};
use crate::topology::volume_layout::{VolumeLayout, VolumeLayoutStatus};
use crate::volume::{FileId, ReplicationPolicy, VolumeId, VolumeInfo};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Full volume report sent by a storage node on registration or heartbeat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeReport {
    /// First report after the node (re)started
    #[serde(default)]
    pub is_initial: bool,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub public_url: String,
    pub max_volume_count: i64,
    #[serde(default)]
    pub data_center: String,
    #[serde(default)]
    pub rack: String,
    #[serde(default)]
    pub volumes: Vec<VolumeInfo>,
}

/// A granted write: where to send it and under which file id
#[derive(Debug, Clone)]
pub struct Assignment {
    pub file_id: FileId,
    /// Number of consecutive keys reserved, starting at `file_id.key`
    pub count: u64,
    /// Primary replica, the write target
    pub node: NodeHandle,
    /// Full replica set, primary first
    pub replicas: Vec<NodeHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopologyStatus {
    pub id: String,
    pub max: i64,
    pub free: i64,
    pub volume_size_limit: u64,
    pub max_volume_id: VolumeId,
    pub data_centers: Vec<DataCenterStatus>,
    pub layouts: Vec<VolumeLayoutStatus>,
}

pub struct Topology {
    id: String,
    tree: RwLock<NodeTree>,
    layouts: [OnceLock<VolumeLayout>; ReplicationPolicy::COUNT],
    volume_size_limit: u64,
    pulse: Duration,
    sequencer: Sequencer,
    configuration: Configuration,
    allocator: Option<Arc<dyn VolumeAllocator>>,
    health: HealthSenders,
    receivers: Mutex<Option<HealthReceivers>>,
    shutdown: watch::Sender<bool>,
}

impl Topology {
    pub fn new(
        id: impl Into<String>,
        sequencer: Sequencer,
        configuration: Configuration,
        volume_size_limit: u64,
    ) -> Self {
        let id = id.into();
        let (health, receivers) = health_channels();
        let (shutdown, _) = watch::channel(false);

        Self {
            tree: RwLock::new(NodeTree::new(id.clone())),
            id,
            layouts: std::array::from_fn(|_| OnceLock::new()),
            volume_size_limit,
            pulse: Duration::from_secs(5),
            sequencer,
            configuration,
            allocator: None,
            health,
            receivers: Mutex::new(Some(receivers)),
            shutdown,
        }
    }

    /// Build a topology from the master configuration, backed by the file
    /// sequence store in `meta_dir`
    pub fn from_config(config: &MasterConfig) -> Result<Self> {
        let store = FileSequenceStore::new(config.sequence_path())?;
        let sequencer = Sequencer::open(store, config.sequence_batch)?;
        let configuration = Configuration::load(config.topology_file.as_deref())?;

        Ok(Self::new(
            config.id.clone(),
            sequencer,
            configuration,
            config.volume_size_limit(),
        )
        .with_pulse(config.pulse()))
    }

    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    /// Install the collaborator that creates volumes on storage nodes.
    /// Without one, volume growth is disabled.
    pub fn with_allocator(mut self, allocator: Arc<dyn VolumeAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pulse(&self) -> Duration {
        self.pulse
    }

    pub fn volume_size_limit(&self) -> u64 {
        self.volume_size_limit
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub(crate) fn allocator(&self) -> Option<&Arc<dyn VolumeAllocator>> {
        self.allocator.as_ref()
    }

    /// Layout for `policy`, created on first use
    pub fn get_volume_layout(&self, policy: ReplicationPolicy) -> &VolumeLayout {
        self.layouts[policy.index()]
            .get_or_init(|| VolumeLayout::new(policy, self.volume_size_limit))
    }

    fn existing_layouts(&self) -> impl Iterator<Item = &VolumeLayout> {
        self.layouts.iter().filter_map(OnceLock::get)
    }

    /// Run `f` against a read-locked view of the node tree
    pub fn with_tree<R>(&self, f: impl FnOnce(&NodeTree) -> R) -> R {
        f(&read(&self.tree))
    }

    pub(crate) fn tree_mut(&self) -> std::sync::RwLockWriteGuard<'_, NodeTree> {
        write(&self.tree)
    }

    /// Apply a node's volume report.
    ///
    /// The node's data center and rack come from the configuration, with the
    /// report's hints as fallback. On an initial report, or when the node
    /// shows up under a different rack, any node already known at that
    /// address is unregistered first. Volumes missing from the report are
    /// dropped. A report from a node marked dead revives it.
    pub fn register_volumes(&self, report: NodeReport) -> Result<NodeHandle> {
        let (dc_name, rack_name) =
            self.configuration
                .locate(&report.ip, &report.data_center, &report.rack);
        let node_id = format!("{}:{}", report.ip, report.port);
        let public_url = if report.public_url.is_empty() {
            node_id.clone()
        } else {
            report.public_url.clone()
        };

        let mut tree = write(&self.tree);

        if let Some(existing) = tree.data_node_index(&node_id) {
            let moved = tree
                .node_handle(existing)
                .map(|h| h.data_center != dc_name || h.rack != rack_name)
                .unwrap_or(true);
            if report.is_initial || moved {
                tracing::info!("Replacing data node {} on fresh registration", node_id);
                self.unregister_locked(&mut tree, existing);
            }
        }

        let dc = tree.get_or_create_data_center(&dc_name);
        let rack = tree.get_or_create_rack(dc, &rack_name);
        let (idx, created) = tree.get_or_create_data_node(
            rack,
            &report.ip,
            report.port,
            &public_url,
            report.max_volume_count,
        );
        if created {
            METRICS.nodes_registered.inc();
        }

        let was_dead = match tree.data_node_mut(idx) {
            Some(dn) => {
                dn.last_seen = timestamp_now();
                dn.dead
            }
            None => return Err(Error::Internal(format!("{} is not a data node", node_id))),
        };
        if was_dead {
            self.revive_locked(&mut tree, idx);
        }

        let reported: HashSet<VolumeId> = report.volumes.iter().map(|v| v.id).collect();
        let stale: Vec<VolumeInfo> = tree
            .data_node(idx)
            .map(|dn| {
                dn.volumes()
                    .filter(|v| !reported.contains(&v.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for info in stale {
            tracing::debug!("Data node {} no longer reports volume {}", node_id, info.id);
            tree.remove_volume(idx, info.id);
            self.get_volume_layout(info.replication)
                .set_volume_unavailable(info.id, &node_id);
        }

        for info in &report.volumes {
            tree.add_or_update_volume(idx, info.clone());
        }
        METRICS
            .max_volume_id
            .set(tree.counters(tree.root()).max_volume_id.0 as u64);

        let handle = tree
            .node_handle(idx)
            .ok_or_else(|| Error::Internal(format!("{} lost its location", node_id)))?;
        for info in &report.volumes {
            self.get_volume_layout(info.replication)
                .register_volume(info, &handle);
        }
        Ok(handle)
    }

    /// Remove the data node `id` from every layout and from the tree
    pub fn unregister_data_node(&self, id: &str) -> Result<()> {
        let mut tree = write(&self.tree);
        let idx = tree
            .data_node_index(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
        self.unregister_locked(&mut tree, idx);
        Ok(())
    }

    fn unregister_locked(&self, tree: &mut NodeTree, idx: NodeIdx) {
        let Some(dn) = tree.data_node(idx) else {
            return;
        };
        let id = dn.url();
        for info in dn.volumes() {
            self.get_volume_layout(info.replication)
                .set_volume_unavailable(info.id, &id);
        }

        if let Some(parent) = tree[idx].parent {
            tree.unlink_child(parent, &id);
        }
        METRICS.nodes_unregistered.inc();
        tracing::info!("Unregistered data node {}", id);
    }

    /// Replica set of `vid`, searching every layout in policy order
    pub fn lookup(&self, vid: VolumeId) -> Option<Vec<NodeHandle>> {
        self.existing_layouts().find_map(|layout| layout.lookup(vid))
    }

    /// Choose a volume and replica set for `count` new files and reserve the
    /// keys for them.
    pub fn pick_for_write(
        &self,
        policy: ReplicationPolicy,
        count: u64,
        data_center: Option<&str>,
    ) -> Result<Assignment> {
        let target = self
            .get_volume_layout(policy)
            .pick_for_write(count, data_center)?;
        let node = target
            .nodes
            .first()
            .cloned()
            .ok_or(Error::NoWritableVolumes)?;

        let (key, granted) = self.sequencer.next_file_id(count)?;
        let file_id = FileId::new(target.volume_id, key, rand::random::<u32>());

        Ok(Assignment {
            file_id,
            count: granted,
            node,
            replicas: target.nodes,
        })
    }

    /// Mint a fresh volume id above every id seen so far. Fails with
    /// `NoFreeSpace` once some node has reported the largest possible id.
    pub fn next_volume_id(&self) -> Result<VolumeId> {
        let mut tree = write(&self.tree);
        Self::next_volume_id_locked(&mut tree)
    }

    fn next_volume_id_locked(tree: &mut NodeTree) -> Result<VolumeId> {
        let root = tree.root();
        let vid = tree
            .counters(root)
            .max_volume_id
            .next()
            .ok_or_else(|| Error::NoFreeSpace("volume id space exhausted".into()))?;
        tree.up_adjust_max_volume_id(root, vid);
        METRICS.max_volume_id.set(vid.0 as u64);
        Ok(vid)
    }

    /// Volume slots left across the cluster
    pub fn free_space(&self) -> i64 {
        let tree = read(&self.tree);
        tree.free_space(tree.root())
    }

    /// Pick a live node with a free slot, weighted by free slots, and mint the
    /// volume id to create on it.
    pub fn randomly_reserve_one_volume(
        &self,
        data_center: Option<&str>,
    ) -> Result<(NodeHandle, VolumeId)> {
        let data_center = data_center.filter(|dc| !dc.is_empty());
        let mut tree = write(&self.tree);
        if tree.free_space(tree.root()) <= 0 {
            return Err(Error::NoFreeSpace("topology".into()));
        }

        let candidates: Vec<(NodeHandle, i64)> = tree
            .data_node_indexes()
            .filter(|idx| tree.data_node(*idx).map(|dn| !dn.dead).unwrap_or(false))
            .filter_map(|idx| {
                let free = tree.free_space(idx);
                let handle = tree.node_handle(idx)?;
                let in_dc = data_center.map(|dc| handle.data_center == dc).unwrap_or(true);
                (free > 0 && in_dc).then_some((handle, free))
            })
            .collect();

        let (node, _) = candidates
            .choose_weighted(&mut rand::thread_rng(), |c| c.1)
            .map_err(|_| Error::NoFreeSpace(data_center.unwrap_or("topology").to_string()))?;
        let node = node.clone();

        let vid = Self::next_volume_id_locked(&mut tree)?;
        tracing::debug!("Reserved volume {} on {}", vid, node.id);
        Ok((node, vid))
    }

    /// Queue a dead-node event for the maintenance loop
    pub fn mark_data_node_dead(&self, id: &str) -> bool {
        self.health.dead(id)
    }

    /// Queue a recovered-node event for the maintenance loop
    pub fn mark_data_node_recovered(&self, id: &str) -> bool {
        self.health.recovered(id)
    }

    /// Queue a volume reported full by a storage node
    pub fn report_full_volume(&self, replication: ReplicationPolicy, volume_id: VolumeId) -> bool {
        self.health.full(FullVolume {
            replication,
            volume_id,
        })
    }

    /// Receivers of the health channels; handed out once
    pub fn take_health_receivers(&self) -> Option<HealthReceivers> {
        lock(&self.receivers).take()
    }

    /// Take the data node `id` out of every replica set and zero its active
    /// volume count. Returns false if the node is unknown or already dead.
    pub fn process_dead_node(&self, id: &str) -> bool {
        let mut tree = write(&self.tree);
        let Some(idx) = tree.data_node_index(id) else {
            return false;
        };
        let Some(dn) = tree.data_node_mut(idx) else {
            return false;
        };
        if dn.dead {
            return false;
        }
        dn.dead = true;

        for info in dn.volumes() {
            self.get_volume_layout(info.replication)
                .set_volume_unavailable(info.id, id);
        }
        let active = tree.counters(idx).active_volume_count;
        tree.up_adjust_active_volume_count(idx, -active);

        METRICS.nodes_dead.inc();
        tracing::warn!("Data node {} is dead, {} volumes unavailable", id, active);
        true
    }

    /// Bring the data node `id` back into the replica sets of its volumes.
    /// Returns false if the node is unknown or not dead.
    pub fn process_recovered_node(&self, id: &str) -> bool {
        let mut tree = write(&self.tree);
        let Some(idx) = tree.data_node_index(id) else {
            return false;
        };
        if !tree.data_node(idx).map(|dn| dn.dead).unwrap_or(false) {
            return false;
        }
        self.revive_locked(&mut tree, idx);
        true
    }

    fn revive_locked(&self, tree: &mut NodeTree, idx: NodeIdx) {
        let Some(dn) = tree.data_node_mut(idx) else {
            return;
        };
        dn.dead = false;
        let volumes: Vec<VolumeInfo> = dn.volumes().cloned().collect();

        let inactive = tree.counters(idx).volume_count - tree.counters(idx).active_volume_count;
        tree.up_adjust_active_volume_count(idx, inactive);

        if let Some(handle) = tree.node_handle(idx) {
            for info in &volumes {
                self.get_volume_layout(info.replication)
                    .register_volume(info, &handle);
            }
            tracing::info!("Data node {} recovered with {} volumes", handle.id, volumes.len());
        }
        METRICS.nodes_recovered.inc();
    }

    /// Move a volume from writable to full
    pub fn process_full_volume(&self, event: FullVolume) -> bool {
        let full = self
            .get_volume_layout(event.replication)
            .set_volume_full(event.volume_id);
        if full {
            METRICS.volumes_full.inc();
        }
        full
    }

    /// Live data nodes whose last heartbeat is more than `threshold_secs`
    /// older than `now`
    pub fn collect_stale_data_nodes(&self, now: u64, threshold_secs: u64) -> Vec<String> {
        let tree = read(&self.tree);
        tree.data_node_indexes()
            .filter_map(|idx| tree.data_node(idx))
            .filter(|dn| !dn.dead && dn.last_seen.saturating_add(threshold_secs) < now)
            .map(|dn| dn.url())
            .collect()
    }

    pub fn to_status(&self) -> TopologyStatus {
        let tree = read(&self.tree);
        let root = tree.root();
        let counters = tree.counters(root);
        TopologyStatus {
            id: self.id.clone(),
            max: counters.max_volume_count,
            free: counters.free_space(),
            volume_size_limit: self.volume_size_limit,
            max_volume_id: counters.max_volume_id,
            data_centers: tree
                .children(root)
                .map(|dc| tree.data_center_status(dc))
                .collect(),
            layouts: self.existing_layouts().map(VolumeLayout::to_status).collect(),
        }
    }

    /// Watch channel flipped to `true` on shutdown
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stop the background tasks
    pub fn shutdown(&self) {
        tracing::info!("Topology {} shutting down", self.id);
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::MemorySequenceStore;

    const LIMIT: u64 = 100;

    fn topology() -> Topology {
        let sequencer = Sequencer::open(MemorySequenceStore::new(), 100).unwrap();
        Topology::new("topo", sequencer, Configuration::new(), LIMIT)
    }

    fn report(ip: &str, dc: &str, rack: &str, volumes: Vec<VolumeInfo>) -> NodeReport {
        NodeReport {
            is_initial: true,
            ip: ip.to_string(),
            port: 8080,
            public_url: format!("{}.public:8080", ip),
            max_volume_count: 10,
            data_center: dc.to_string(),
            rack: rack.to_string(),
            volumes,
        }
    }

    fn single(vid: u32, size: u64) -> VolumeInfo {
        VolumeInfo::new(vid, ReplicationPolicy::Single, size)
    }

    #[test]
    fn test_register_and_pick() {
        let topo = topology();
        let node = topo
            .register_volumes(report("10.0.0.1", "dc1", "rackA", vec![single(5, 0)]))
            .unwrap();
        assert_eq!(node.data_center, "dc1");
        assert_eq!(node.rack, "rackA");

        let assignment = topo
            .pick_for_write(ReplicationPolicy::Single, 1, Some("dc1"))
            .unwrap();
        assert_eq!(assignment.file_id.volume_id, VolumeId(5));
        assert_eq!(assignment.node.id, "10.0.0.1:8080");
        assert_eq!(assignment.node.public_url, "10.0.0.1.public:8080");
        assert_eq!(assignment.count, 1);
    }

    #[test]
    fn test_pick_with_no_volumes_fails() {
        let topo = topology();
        assert!(matches!(
            topo.pick_for_write(ReplicationPolicy::Single, 1, None),
            Err(Error::NoWritableVolumes)
        ));
    }

    #[test]
    fn test_keys_are_not_reused_across_picks() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r", vec![single(1, 0)]))
            .unwrap();

        let a = topo.pick_for_write(ReplicationPolicy::Single, 3, None).unwrap();
        let b = topo.pick_for_write(ReplicationPolicy::Single, 1, None).unwrap();
        assert_eq!(b.file_id.key, a.file_id.key + 3);
    }

    #[test]
    fn test_counters_follow_registration() {
        let topo = topology();
        topo.register_volumes(report(
            "10.0.0.1",
            "dc1",
            "r1",
            vec![single(1, 0), single(2, 0)],
        ))
        .unwrap();
        topo.register_volumes(report("10.0.0.2", "dc1", "r2", vec![single(3, 0)]))
            .unwrap();

        topo.with_tree(|tree| {
            let root = tree.counters(tree.root());
            assert_eq!(root.volume_count, 3);
            assert_eq!(root.active_volume_count, 3);
            assert_eq!(root.max_volume_count, 20);
            assert_eq!(root.max_volume_id, VolumeId(3));
        });
        assert_eq!(topo.free_space(), 17);
    }

    #[test]
    fn test_heartbeat_drops_unreported_volumes() {
        let topo = topology();
        topo.register_volumes(report(
            "10.0.0.1",
            "dc1",
            "r1",
            vec![single(1, 0), single(2, 0)],
        ))
        .unwrap();

        let mut heartbeat = report("10.0.0.1", "dc1", "r1", vec![single(2, 10)]);
        heartbeat.is_initial = false;
        topo.register_volumes(heartbeat).unwrap();

        assert!(topo.lookup(VolumeId(1)).is_none());
        assert!(topo.lookup(VolumeId(2)).is_some());
        topo.with_tree(|tree| assert_eq!(tree.counters(tree.root()).volume_count, 1));
    }

    #[test]
    fn test_initial_report_replaces_stale_node() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(1, 0)]))
            .unwrap();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(7, 0)]))
            .unwrap();

        assert!(topo.lookup(VolumeId(1)).is_none());
        assert!(topo.lookup(VolumeId(7)).is_some());
        topo.with_tree(|tree| {
            let root = tree.counters(tree.root());
            assert_eq!(root.volume_count, 1);
            assert_eq!(root.max_volume_count, 10);
        });
    }

    #[test]
    fn test_node_moving_racks_is_relocated() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(1, 0)]))
            .unwrap();
        let mut moved = report("10.0.0.1", "dc1", "r2", vec![single(1, 0)]);
        moved.is_initial = false;
        let handle = topo.register_volumes(moved).unwrap();

        assert_eq!(handle.rack, "r2");
        let replicas = topo.lookup(VolumeId(1)).unwrap();
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].rack, "r2");
    }

    #[test]
    fn test_unregister_data_node() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(1, 0)]))
            .unwrap();

        topo.unregister_data_node("10.0.0.1:8080").unwrap();
        assert!(topo.lookup(VolumeId(1)).is_none());
        assert_eq!(topo.free_space(), 0);
        assert!(matches!(
            topo.unregister_data_node("10.0.0.1:8080"),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_dead_and_recovered_processing() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(5, 0)]))
            .unwrap();

        assert!(topo.process_dead_node("10.0.0.1:8080"));
        assert!(!topo.process_dead_node("10.0.0.1:8080"));
        assert!(topo.lookup(VolumeId(5)).is_none());
        assert!(topo
            .pick_for_write(ReplicationPolicy::Single, 1, Some("dc1"))
            .is_err());
        topo.with_tree(|tree| {
            let root = tree.counters(tree.root());
            assert_eq!(root.active_volume_count, 0);
            assert_eq!(root.volume_count, 1);
        });

        assert!(topo.process_recovered_node("10.0.0.1:8080"));
        assert!(!topo.process_recovered_node("10.0.0.1:8080"));
        assert!(topo
            .pick_for_write(ReplicationPolicy::Single, 1, Some("dc1"))
            .is_ok());
        topo.with_tree(|tree| assert_eq!(tree.counters(tree.root()).active_volume_count, 1));
    }

    #[test]
    fn test_heartbeat_revives_dead_node() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(5, 0)]))
            .unwrap();
        topo.process_dead_node("10.0.0.1:8080");

        let mut heartbeat = report("10.0.0.1", "dc1", "r1", vec![single(5, 0)]);
        heartbeat.is_initial = false;
        topo.register_volumes(heartbeat).unwrap();

        assert!(topo.get_volume_layout(ReplicationPolicy::Single).is_writable(VolumeId(5)));
        topo.with_tree(|tree| assert_eq!(tree.counters(tree.root()).active_volume_count, 1));
    }

    #[test]
    fn test_full_volume_processing() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(5, 0)]))
            .unwrap();

        assert!(topo.process_full_volume(FullVolume {
            replication: ReplicationPolicy::Single,
            volume_id: VolumeId(5),
        }));
        assert!(topo.pick_for_write(ReplicationPolicy::Single, 1, None).is_err());
        // lookups still resolve full volumes
        assert!(topo.lookup(VolumeId(5)).is_some());
    }

    #[test]
    fn test_lookup_searches_every_policy() {
        let topo = topology();
        topo.register_volumes(report(
            "10.0.0.1",
            "dc1",
            "r1",
            vec![VolumeInfo::new(9, ReplicationPolicy::DiffRack, 0)],
        ))
        .unwrap();

        assert!(topo
            .get_volume_layout(ReplicationPolicy::Single)
            .lookup(VolumeId(9))
            .is_none());
        assert_eq!(topo.lookup(VolumeId(9)).unwrap().len(), 1);
    }

    #[test]
    fn test_next_volume_id_is_monotonic() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(4, 0)]))
            .unwrap();
        assert_eq!(topo.next_volume_id().unwrap(), VolumeId(5));
        assert_eq!(topo.next_volume_id().unwrap(), VolumeId(6));
    }

    #[test]
    fn test_next_volume_id_fails_when_id_space_exhausted() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(u32::MAX, 0)]))
            .unwrap();

        assert!(matches!(topo.next_volume_id(), Err(Error::NoFreeSpace(_))));
        assert!(matches!(
            topo.randomly_reserve_one_volume(None),
            Err(Error::NoFreeSpace(_))
        ));
        // the running maximum is left alone
        topo.with_tree(|tree| {
            assert_eq!(tree.counters(tree.root()).max_volume_id, VolumeId(u32::MAX))
        });
    }

    #[test]
    fn test_randomly_reserve_one_volume() {
        let topo = topology();
        assert!(matches!(
            topo.randomly_reserve_one_volume(None),
            Err(Error::NoFreeSpace(_))
        ));

        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![])).unwrap();
        topo.register_volumes(report("10.0.0.2", "dc2", "r1", vec![])).unwrap();

        let (node, vid) = topo.randomly_reserve_one_volume(Some("dc2")).unwrap();
        assert_eq!(node.id, "10.0.0.2:8080");
        assert_eq!(vid, VolumeId(1));
        assert!(topo.randomly_reserve_one_volume(Some("dc9")).is_err());
    }

    #[test]
    fn test_stale_nodes() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![])).unwrap();
        let now = timestamp_now();

        assert!(topo.collect_stale_data_nodes(now, 15).is_empty());
        assert_eq!(
            topo.collect_stale_data_nodes(now + 60, 15),
            vec!["10.0.0.1:8080".to_string()]
        );
        topo.process_dead_node("10.0.0.1:8080");
        assert!(topo.collect_stale_data_nodes(now + 60, 15).is_empty());
    }

    #[test]
    fn test_status_snapshot() {
        let topo = topology();
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", vec![single(1, 0)]))
            .unwrap();

        let status = topo.to_status();
        assert_eq!(status.id, "topo");
        assert_eq!(status.max, 10);
        assert_eq!(status.free, 9);
        assert_eq!(status.data_centers.len(), 1);
        assert_eq!(status.layouts.len(), 1);
        assert!(serde_json::to_string(&status).unwrap().contains("\"dc1\""));
    }

    #[test]
    fn test_health_receivers_taken_once() {
        let topo = topology();
        assert!(topo.take_health_receivers().is_some());
        assert!(topo.take_health_receivers().is_none());
    }
}
