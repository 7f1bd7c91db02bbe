//! Aggregate counters across registration, heartbeats and re-registration

use blobmaster::sequence::{MemorySequenceStore, Sequencer};
use blobmaster::topology::{Configuration, NodeTree};
use blobmaster::{NodeReport, ReplicationPolicy, Topology, VolumeId, VolumeInfo};

fn topology() -> Topology {
    let sequencer = Sequencer::open(MemorySequenceStore::new(), 100).unwrap();
    Topology::new("topo", sequencer, Configuration::new(), 1_000)
}

fn report(ip: &str, dc: &str, rack: &str, vids: &[u32], is_initial: bool) -> NodeReport {
    NodeReport {
        is_initial,
        ip: ip.to_string(),
        port: 8080,
        max_volume_count: 20,
        data_center: dc.to_string(),
        rack: rack.to_string(),
        volumes: vids
            .iter()
            .map(|v| VolumeInfo::new(*v, ReplicationPolicy::Single, 0))
            .collect(),
        ..Default::default()
    }
}

/// Every inner node holds the sum of its children
fn assert_sums(tree: &NodeTree) {
    let mut stack = vec![tree.root()];
    while let Some(idx) = stack.pop() {
        let children: Vec<_> = tree.children(idx).collect();
        if children.is_empty() {
            continue;
        }
        let own = tree.counters(idx);
        let (mut volumes, mut active, mut max) = (0, 0, 0);
        for child in &children {
            let c = tree.counters(*child);
            volumes += c.volume_count;
            active += c.active_volume_count;
            max += c.max_volume_count;
        }
        assert_eq!(own.volume_count, volumes, "volume count of {}", tree[idx].id);
        assert_eq!(own.active_volume_count, active, "active count of {}", tree[idx].id);
        assert_eq!(own.max_volume_count, max, "capacity of {}", tree[idx].id);
        stack.extend(children);
    }
}

#[test]
fn test_sums_hold_through_lifecycle() {
    let topo = topology();

    topo.register_volumes(report("10.0.0.1", "dc1", "r1", &[1, 2, 3], true))
        .unwrap();
    topo.register_volumes(report("10.0.0.2", "dc1", "r2", &[4], true))
        .unwrap();
    topo.register_volumes(report("10.0.1.1", "dc2", "r1", &[5, 6], true))
        .unwrap();
    topo.with_tree(assert_sums);

    // heartbeat adding and dropping volumes
    topo.register_volumes(report("10.0.0.1", "dc1", "r1", &[2, 3, 7], false))
        .unwrap();
    topo.with_tree(assert_sums);

    // restart with a different volume set
    topo.register_volumes(report("10.0.1.1", "dc2", "r1", &[8], true))
        .unwrap();
    topo.with_tree(assert_sums);

    topo.process_dead_node("10.0.0.2:8080");
    topo.with_tree(assert_sums);

    topo.unregister_data_node("10.0.0.1:8080").unwrap();
    topo.with_tree(|tree| {
        assert_sums(tree);
        let root = tree.counters(tree.root());
        assert_eq!(root.volume_count, 2);
        assert_eq!(root.active_volume_count, 1);
        assert_eq!(root.max_volume_count, 40);
        assert_eq!(root.max_volume_id, VolumeId(8));
    });
}

#[test]
fn test_volume_count_equals_distinct_ids() {
    let topo = topology();
    let mut seen = Vec::new();
    for vid in [3u32, 1, 3, 9, 1, 4] {
        if !seen.contains(&vid) {
            seen.push(vid);
        }
        topo.register_volumes(report("10.0.0.1", "dc1", "r1", &seen, false))
            .unwrap();
        topo.with_tree(|tree| {
            for idx in [tree.root(), tree.data_node_index("10.0.0.1:8080").unwrap()] {
                assert_eq!(tree.counters(idx).volume_count, seen.len() as i64);
            }
        });
    }
}

#[test]
fn test_re_registration_replaces_stale_node() {
    let topo = topology();
    topo.register_volumes(report("10.0.0.1", "dc1", "r1", &[1, 2], true))
        .unwrap();
    topo.register_volumes(report("10.0.0.1", "dc1", "r1", &[3], true))
        .unwrap();

    assert!(topo.lookup(VolumeId(1)).is_none());
    assert!(topo.lookup(VolumeId(2)).is_none());
    assert_eq!(topo.lookup(VolumeId(3)).unwrap()[0].id, "10.0.0.1:8080");
    assert_eq!(topo.free_space(), 19);

    let status = topo.to_status();
    let nodes = &status.data_centers[0].racks[0].data_nodes;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].volumes, 1);
}
