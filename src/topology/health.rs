//! Node health events and the background tasks consuming them
//!
//! Producers (the liveness watchdog, the heartbeat layer) push onto unbounded
//! channels and never wait. A single maintenance loop applies the events to
//! the topology. Every event is idempotent, so a lagging consumer only delays
//! the state change.

use crate::common::timestamp_now;
use crate::topology::topology::Topology;
use crate::volume::{ReplicationPolicy, VolumeId};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Pulses without a heartbeat before a node is declared dead
pub const STALE_PULSES: u64 = 3;

/// A volume reported full by one of its replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullVolume {
    pub replication: ReplicationPolicy,
    pub volume_id: VolumeId,
}

pub(crate) struct HealthSenders {
    dead: UnboundedSender<String>,
    recovered: UnboundedSender<String>,
    full: UnboundedSender<FullVolume>,
}

impl HealthSenders {
    pub(crate) fn dead(&self, id: &str) -> bool {
        self.dead.send(id.to_string()).is_ok()
    }

    pub(crate) fn recovered(&self, id: &str) -> bool {
        self.recovered.send(id.to_string()).is_ok()
    }

    pub(crate) fn full(&self, event: FullVolume) -> bool {
        self.full.send(event).is_ok()
    }
}

/// Consumer side of the health channels
pub struct HealthReceivers {
    dead: UnboundedReceiver<String>,
    recovered: UnboundedReceiver<String>,
    full: UnboundedReceiver<FullVolume>,
}

pub(crate) fn health_channels() -> (HealthSenders, HealthReceivers) {
    let (dead_tx, dead_rx) = unbounded_channel();
    let (recovered_tx, recovered_rx) = unbounded_channel();
    let (full_tx, full_rx) = unbounded_channel();
    (
        HealthSenders {
            dead: dead_tx,
            recovered: recovered_tx,
            full: full_tx,
        },
        HealthReceivers {
            dead: dead_rx,
            recovered: recovered_rx,
            full: full_rx,
        },
    )
}

impl HealthReceivers {
    /// Apply every queued event without waiting. Returns the number of
    /// events taken off the channels.
    pub fn drain_pending(&mut self, topo: &Topology) -> usize {
        let mut applied = 0;
        while let Ok(id) = self.dead.try_recv() {
            topo.process_dead_node(&id);
            applied += 1;
        }
        while let Ok(id) = self.recovered.try_recv() {
            topo.process_recovered_node(&id);
            applied += 1;
        }
        while let Ok(event) = self.full.try_recv() {
            topo.process_full_volume(event);
            applied += 1;
        }
        applied
    }
}

/// Apply health events as they arrive until the topology shuts down
pub async fn run_maintenance(topo: Arc<Topology>, mut rx: HealthReceivers) {
    let mut shutdown = topo.shutdown_signal();
    tracing::info!("Topology maintenance loop started");

    loop {
        let stopping = *shutdown.borrow();
        if stopping {
            break;
        }
        tokio::select! {
            Some(id) = rx.dead.recv() => {
                topo.process_dead_node(&id);
            }
            Some(id) = rx.recovered.recv() => {
                topo.process_recovered_node(&id);
            }
            Some(event) = rx.full.recv() => {
                topo.process_full_volume(event);
            }
            _ = shutdown.changed() => {}
            else => break,
        }
    }

    tracing::info!("Topology maintenance loop stopped");
}

/// Spawn [`run_maintenance`] on the current runtime. Returns `None` if the
/// health receivers were already taken.
pub fn spawn_maintenance(topo: Arc<Topology>) -> Option<JoinHandle<()>> {
    let rx = topo.take_health_receivers()?;
    Some(tokio::spawn(run_maintenance(topo, rx)))
}

/// Every pulse, declare dead the live nodes that missed [`STALE_PULSES`]
/// heartbeats
pub fn spawn_liveness_watchdog(topo: Arc<Topology>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pulse = topo.pulse();
        let threshold = pulse.as_secs().max(1) * STALE_PULSES;
        let mut ticker = tokio::time::interval(pulse);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = topo.shutdown_signal();

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    for id in topo.collect_stale_data_nodes(timestamp_now(), threshold) {
                        tracing::warn!("Data node {} missed {} heartbeats", id, STALE_PULSES);
                        topo.mark_data_node_dead(&id);
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::debug!("Liveness watchdog stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{MemorySequenceStore, Sequencer};
    use crate::topology::configuration::Configuration;
    use crate::topology::topology::NodeReport;
    use crate::volume::VolumeInfo;
    use std::time::Duration;

    fn topology_with_node() -> Arc<Topology> {
        let sequencer = Sequencer::open(MemorySequenceStore::new(), 100).unwrap();
        let topo = Topology::new("topo", sequencer, Configuration::new(), 100)
            .with_pulse(Duration::from_millis(20));
        topo.register_volumes(NodeReport {
            is_initial: true,
            ip: "10.0.0.1".into(),
            port: 8080,
            max_volume_count: 5,
            data_center: "dc1".into(),
            rack: "r1".into(),
            volumes: vec![VolumeInfo::new(5, ReplicationPolicy::Single, 0)],
            ..Default::default()
        })
        .unwrap();
        Arc::new(topo)
    }

    #[test]
    fn test_drain_pending_applies_events() {
        let topo = topology_with_node();
        let mut rx = topo.take_health_receivers().unwrap();

        assert!(topo.mark_data_node_dead("10.0.0.1:8080"));
        assert!(topo.mark_data_node_dead("10.0.0.1:8080"));
        // nothing happens until the queue is drained
        assert!(topo.lookup(VolumeId(5)).is_some());

        assert_eq!(rx.drain_pending(&topo), 2);
        assert!(topo.lookup(VolumeId(5)).is_none());

        topo.mark_data_node_recovered("10.0.0.1:8080");
        assert_eq!(rx.drain_pending(&topo), 1);
        assert!(topo.lookup(VolumeId(5)).is_some());
        assert_eq!(rx.drain_pending(&topo), 0);
    }

    #[test]
    fn test_send_fails_once_receivers_dropped() {
        let topo = topology_with_node();
        drop(topo.take_health_receivers());
        assert!(!topo.mark_data_node_dead("10.0.0.1:8080"));
        assert!(!topo.report_full_volume(ReplicationPolicy::Single, VolumeId(5)));
    }

    #[tokio::test]
    async fn test_maintenance_loop_processes_full_volume() {
        let topo = topology_with_node();
        let handle = spawn_maintenance(topo.clone()).unwrap();
        assert!(spawn_maintenance(topo.clone()).is_none());

        topo.report_full_volume(ReplicationPolicy::Single, VolumeId(5));
        let layout = topo.get_volume_layout(ReplicationPolicy::Single);
        for _ in 0..100 {
            if layout.is_full(VolumeId(5)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(layout.is_full(VolumeId(5)));

        topo.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_watchdog_declares_silent_node_dead() {
        let topo = topology_with_node();
        let maintenance = spawn_maintenance(topo.clone()).unwrap();

        // pretend the last heartbeat is long gone
        {
            let mut tree = topo.tree_mut();
            let idx = tree.data_node_index("10.0.0.1:8080").unwrap();
            tree.data_node_mut(idx).unwrap().last_seen = 0;
        }
        let watchdog = spawn_liveness_watchdog(topo.clone());

        for _ in 0..100 {
            if topo.lookup(VolumeId(5)).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(topo.lookup(VolumeId(5)).is_none());
        let dead = topo.with_tree(|tree| {
            let idx = tree.data_node_index("10.0.0.1:8080").unwrap();
            tree.data_node(idx).unwrap().dead
        });
        assert!(dead);

        topo.shutdown();
        watchdog.await.unwrap();
        maintenance.await.unwrap();
    }
}
