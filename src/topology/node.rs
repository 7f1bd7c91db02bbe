//! Node hierarchy
//!
//! The cluster is a tree: topology → data center → rack → data node. Nodes
//! live in an arena owned by [`NodeTree`]; a parent owns its children through
//! an id → index map, and each child keeps the plain index of its parent.
//!
//! Every node carries aggregate counters. Data node counters are
//! authoritative; each change is applied to the leaf and then to every
//! ancestor up to the root, so an inner node always holds the sum over its
//! children. The depth is fixed at four, so an adjustment is O(1).

use crate::topology::data_node::DataNode;
use crate::volume::VolumeId;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::{Index, IndexMut};

/// Index of a node inside its [`NodeTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdx(usize);

/// Aggregate counters kept on every tree node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounters {
    pub volume_count: i64,
    pub active_volume_count: i64,
    pub max_volume_count: i64,
    pub max_volume_id: VolumeId,
}

impl NodeCounters {
    /// Volume slots still available
    pub fn free_space(&self) -> i64 {
        self.max_volume_count - self.volume_count
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Topology,
    DataCenter,
    Rack,
    DataNode(DataNode),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Topology => "Topology",
            NodeKind::DataCenter => "DataCenter",
            NodeKind::Rack => "Rack",
            NodeKind::DataNode(_) => "DataNode",
        }
    }
}

#[derive(Debug)]
pub struct TreeNode {
    pub id: String,
    pub kind: NodeKind,
    pub parent: Option<NodeIdx>,
    pub children: BTreeMap<String, NodeIdx>,
    pub counters: NodeCounters,
}

impl TreeNode {
    fn new(id: String, kind: NodeKind, parent: Option<NodeIdx>) -> Self {
        Self {
            id,
            kind,
            parent,
            children: BTreeMap::new(),
            counters: NodeCounters::default(),
        }
    }

    pub fn is_data_node(&self) -> bool {
        matches!(self.kind, NodeKind::DataNode(_))
    }

    pub fn as_data_node(&self) -> Option<&DataNode> {
        match &self.kind {
            NodeKind::DataNode(dn) => Some(dn),
            _ => None,
        }
    }

    pub fn as_data_node_mut(&mut self) -> Option<&mut DataNode> {
        match &mut self.kind {
            NodeKind::DataNode(dn) => Some(dn),
            _ => None,
        }
    }
}

/// Arena holding the whole hierarchy
#[derive(Debug)]
pub struct NodeTree {
    nodes: Vec<Option<TreeNode>>,
    free_slots: Vec<usize>,
    root: NodeIdx,
    /// data node id (`ip:port`) → index
    data_nodes: HashMap<String, NodeIdx>,
}

impl NodeTree {
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            nodes: vec![Some(TreeNode::new(root_id.into(), NodeKind::Topology, None))],
            free_slots: Vec::new(),
            root: NodeIdx(0),
            data_nodes: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn get(&self, idx: NodeIdx) -> Option<&TreeNode> {
        self.nodes.get(idx.0).and_then(|n| n.as_ref())
    }

    pub fn get_mut(&mut self, idx: NodeIdx) -> Option<&mut TreeNode> {
        self.nodes.get_mut(idx.0).and_then(|n| n.as_mut())
    }

    /// Child of `parent` named `id`
    pub fn child(&self, parent: NodeIdx, id: &str) -> Option<NodeIdx> {
        self.get(parent).and_then(|p| p.children.get(id).copied())
    }

    pub fn children(&self, parent: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        self.get(parent)
            .into_iter()
            .flat_map(|p| p.children.values().copied())
    }

    /// Create a node and link it under `parent`, which takes ownership
    pub fn link_child(
        &mut self,
        parent: NodeIdx,
        id: impl Into<String>,
        kind: NodeKind,
    ) -> NodeIdx {
        let id = id.into();
        let is_data_node = matches!(kind, NodeKind::DataNode(_));
        let node = TreeNode::new(id.clone(), kind, Some(parent));

        let idx = match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeIdx(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeIdx(self.nodes.len() - 1)
            }
        };

        self[parent].children.insert(id.clone(), idx);
        if is_data_node {
            self.data_nodes.insert(id, idx);
        }
        idx
    }

    /// Unlink the child `id` from `parent`, subtracting its counters from
    /// every ancestor. The detached node is returned; its own children are
    /// released with it.
    pub fn unlink_child(&mut self, parent: NodeIdx, id: &str) -> Option<TreeNode> {
        let idx = self.get_mut(parent)?.children.remove(id)?;
        let counters = self[idx].counters;

        self.up_adjust_volume_count(parent, -counters.volume_count);
        self.up_adjust_active_volume_count(parent, -counters.active_volume_count);
        self.up_adjust_max_volume_count(parent, -counters.max_volume_count);

        let mut node = self.release(idx)?;
        node.parent = None;
        Some(node)
    }

    fn release(&mut self, idx: NodeIdx) -> Option<TreeNode> {
        let node = self.nodes.get_mut(idx.0)?.take()?;
        self.free_slots.push(idx.0);
        if node.is_data_node() {
            self.data_nodes.remove(&node.id);
        }
        for child in node.children.values() {
            self.release(*child);
        }
        Some(node)
    }

    pub fn up_adjust_volume_count(&mut self, idx: NodeIdx, delta: i64) {
        self.walk_up(idx, |c| c.volume_count += delta);
    }

    pub fn up_adjust_active_volume_count(&mut self, idx: NodeIdx, delta: i64) {
        self.walk_up(idx, |c| c.active_volume_count += delta);
    }

    pub fn up_adjust_max_volume_count(&mut self, idx: NodeIdx, delta: i64) {
        self.walk_up(idx, |c| c.max_volume_count += delta);
    }

    /// Raise the running maximum volume id on `idx` and its ancestors
    pub fn up_adjust_max_volume_id(&mut self, idx: NodeIdx, vid: VolumeId) {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let Some(node) = self.get_mut(i) else { break };
            if node.counters.max_volume_id >= vid {
                break;
            }
            node.counters.max_volume_id = vid;
            cursor = node.parent;
        }
    }

    fn walk_up(&mut self, idx: NodeIdx, mut apply: impl FnMut(&mut NodeCounters)) {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let Some(node) = self.get_mut(i) else { break };
            apply(&mut node.counters);
            cursor = node.parent;
        }
    }

    pub fn counters(&self, idx: NodeIdx) -> NodeCounters {
        self.get(idx).map(|n| n.counters).unwrap_or_default()
    }

    pub fn free_space(&self, idx: NodeIdx) -> i64 {
        self.counters(idx).free_space()
    }

    /// Index of the data node `id` (`ip:port`)
    pub fn data_node_index(&self, id: &str) -> Option<NodeIdx> {
        self.data_nodes.get(id).copied()
    }

    pub fn data_node(&self, idx: NodeIdx) -> Option<&DataNode> {
        self.get(idx).and_then(TreeNode::as_data_node)
    }

    pub fn data_node_mut(&mut self, idx: NodeIdx) -> Option<&mut DataNode> {
        self.get_mut(idx).and_then(TreeNode::as_data_node_mut)
    }

    /// All data nodes currently linked, in no particular order
    pub fn data_node_indexes(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.data_nodes.values().copied()
    }

    /// Id of the ancestor `levels` above `idx`
    pub fn ancestor_id(&self, idx: NodeIdx, levels: usize) -> Option<&str> {
        let mut cursor = idx;
        for _ in 0..levels {
            cursor = self.get(cursor)?.parent?;
        }
        self.get(cursor).map(|n| n.id.as_str())
    }
}

impl Index<NodeIdx> for NodeTree {
    type Output = TreeNode;

    fn index(&self, idx: NodeIdx) -> &TreeNode {
        match self.get(idx) {
            Some(node) => node,
            None => panic!("stale node index {:?}", idx),
        }
    }
}

impl IndexMut<NodeIdx> for NodeTree {
    fn index_mut(&mut self, idx: NodeIdx) -> &mut TreeNode {
        match self.get_mut(idx) {
            Some(node) => node,
            None => panic!("stale node index {:?}", idx),
        }
    }
}
