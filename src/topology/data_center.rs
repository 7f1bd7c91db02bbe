//! Data centers and racks
//!
//! Both are plain inner nodes of the hierarchy; the only logic they carry is
//! child lookup-or-create by name.

use crate::topology::data_node::{DataNode, DataNodeStatus};
use crate::topology::node::{NodeIdx, NodeKind, NodeTree};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RackStatus {
    pub id: String,
    pub max: i64,
    pub free: i64,
    pub data_nodes: Vec<DataNodeStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataCenterStatus {
    pub id: String,
    pub max: i64,
    pub free: i64,
    pub racks: Vec<RackStatus>,
}

impl NodeTree {
    pub fn get_or_create_data_center(&mut self, name: &str) -> NodeIdx {
        let root = self.root();
        if let Some(idx) = self.child(root, name) {
            return idx;
        }
        tracing::info!("Adding data center {}", name);
        self.link_child(root, name, NodeKind::DataCenter)
    }

    pub fn get_or_create_rack(&mut self, data_center: NodeIdx, name: &str) -> NodeIdx {
        if let Some(idx) = self.child(data_center, name) {
            return idx;
        }
        tracing::info!("Adding rack {} to data center {}", name, self[data_center].id);
        self.link_child(data_center, name, NodeKind::Rack)
    }

    /// Data node of `rack` listening on `ip:port`
    pub fn find_data_node(&self, rack: NodeIdx, ip: &str, port: u16) -> Option<NodeIdx> {
        self.children(rack).find(|idx| {
            self.data_node(*idx)
                .map(|dn| dn.match_location(ip, port))
                .unwrap_or(false)
        })
    }

    /// Data node of `rack` listening on `ip:port`, created if absent.
    ///
    /// The public url and volume capacity are refreshed on every call; a
    /// capacity change is pushed up the tree. Returns the node and whether it
    /// was created.
    pub fn get_or_create_data_node(
        &mut self,
        rack: NodeIdx,
        ip: &str,
        port: u16,
        public_url: &str,
        max_volume_count: i64,
    ) -> (NodeIdx, bool) {
        let (idx, created) = match self.find_data_node(rack, ip, port) {
            Some(idx) => (idx, false),
            None => {
                let dn = DataNode::new(ip, port, public_url);
                tracing::info!("Adding data node {} to rack {}", dn.url(), self[rack].id);
                let id = dn.url();
                (self.link_child(rack, id, NodeKind::DataNode(dn)), true)
            }
        };

        if let Some(dn) = self.data_node_mut(idx) {
            if dn.public_url != public_url {
                dn.public_url = public_url.to_string();
            }
        }
        let delta = max_volume_count - self.counters(idx).max_volume_count;
        if delta != 0 {
            self.up_adjust_max_volume_count(idx, delta);
        }
        (idx, created)
    }

    pub fn rack_status(&self, rack: NodeIdx) -> RackStatus {
        let counters = self.counters(rack);
        RackStatus {
            id: self[rack].id.clone(),
            max: counters.max_volume_count,
            free: counters.free_space(),
            data_nodes: self
                .children(rack)
                .filter_map(|idx| self.data_node_status(idx))
                .collect(),
        }
    }

    pub fn data_center_status(&self, data_center: NodeIdx) -> DataCenterStatus {
        let counters = self.counters(data_center);
        DataCenterStatus {
            id: self[data_center].id.clone(),
            max: counters.max_volume_count,
            free: counters.free_space(),
            racks: self
                .children(data_center)
                .map(|rack| self.rack_status(rack))
                .collect(),
        }
    }
}
