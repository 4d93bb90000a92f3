//! Node-centric view of the routing table
//!
//! Derived data: rebuilt from a routing table and the current membership,
//! never edited by callers. The allocation engine records its own
//! placements into the view it built for a round so that later decisions in
//! the same round see them.

use super::shard_copy::{ShardCopy, ShardId, ShardState};
use super::table::RoutingTable;
use crate::cluster::{NodeDescriptor, NodeSet};
use std::collections::BTreeMap;

/// Copies hosted by, or moving to, one node
#[derive(Debug, Clone)]
pub struct RoutingNode {
    node: NodeDescriptor,
    copies: Vec<ShardCopy>,
    incoming: Vec<ShardCopy>,
}

impl RoutingNode {
    fn new(node: NodeDescriptor) -> Self {
        Self {
            node,
            copies: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.node
    }

    /// Copies whose `node_id` is this node (relocation sources included)
    pub fn copies(&self) -> &[ShardCopy] {
        &self.copies
    }

    /// Copies that should start recovering on this node
    pub fn initializing(&self) -> Vec<&ShardCopy> {
        self.copies
            .iter()
            .filter(|c| c.state() == ShardState::Initializing)
            .collect()
    }

    /// RELOCATING copies whose target is this node
    pub fn incoming_relocations(&self) -> &[ShardCopy] {
        &self.incoming
    }

    /// RELOCATING copies leaving this node
    pub fn outgoing_relocations(&self) -> Vec<&ShardCopy> {
        self.copies
            .iter()
            .filter(|c| c.state() == ShardState::Relocating)
            .collect()
    }

    /// Recoveries this node is receiving: initializing copies plus
    /// incoming relocations
    pub fn initializing_count(&self) -> usize {
        self.copies
            .iter()
            .filter(|c| c.state() == ShardState::Initializing)
            .count()
            + self.incoming.len()
    }

    /// Copies that occupy this node in any assigned state
    pub fn assigned_count(&self) -> usize {
        self.copies.len() + self.incoming.len()
    }

    pub fn hosts_shard(&self, index: &str, shard_id: ShardId) -> bool {
        self.copies
            .iter()
            .chain(self.incoming.iter())
            .any(|c| c.index() == index && c.shard_id() == shard_id)
    }
}

/// Inverse index: node id -> copies on that node
#[derive(Debug, Clone, Default)]
pub struct NodeView {
    nodes: BTreeMap<String, RoutingNode>,
    unassigned: Vec<ShardCopy>,
    orphaned: Vec<ShardCopy>,
}

impl NodeView {
    pub fn new(table: &RoutingTable, nodes: &NodeSet) -> Self {
        Self::from_copies(table.copies(), nodes)
    }

    pub(crate) fn from_copies<'a>(
        copies: impl Iterator<Item = &'a ShardCopy>,
        nodes: &NodeSet,
    ) -> Self {
        let mut view = NodeView {
            nodes: nodes
                .iter()
                .map(|node| (node.id.clone(), RoutingNode::new(node.clone())))
                .collect(),
            ..Default::default()
        };

        for copy in copies {
            let Some(node_id) = copy.node_id() else {
                view.unassigned.push(copy.clone());
                continue;
            };
            match view.nodes.get_mut(node_id) {
                Some(node) => node.copies.push(copy.clone()),
                None => view.orphaned.push(copy.clone()),
            }
            if let Some(target) = copy.relocating_to() {
                if let Some(node) = view.nodes.get_mut(target) {
                    node.incoming.push(copy.clone());
                }
            }
        }
        view
    }

    pub fn node(&self, node_id: &str) -> Option<&RoutingNode> {
        self.nodes.get(node_id)
    }

    /// Nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &RoutingNode> {
        self.nodes.values()
    }

    pub fn hosts_shard(&self, node_id: &str, index: &str, shard_id: ShardId) -> bool {
        self.node(node_id)
            .map(|n| n.hosts_shard(index, shard_id))
            .unwrap_or(false)
    }

    pub fn initializing_count(&self, node_id: &str) -> usize {
        self.node(node_id).map(|n| n.initializing_count()).unwrap_or(0)
    }

    pub fn assigned_count(&self, node_id: &str) -> usize {
        self.node(node_id).map(|n| n.assigned_count()).unwrap_or(0)
    }

    /// Every copy in `state`, member nodes first, then unassigned, then
    /// orphaned
    pub fn copies_with_state(&self, state: ShardState) -> Vec<&ShardCopy> {
        self.nodes
            .values()
            .flat_map(|n| n.copies.iter())
            .chain(self.unassigned.iter())
            .chain(self.orphaned.iter())
            .filter(|c| c.state() == state)
            .collect()
    }

    pub fn unassigned(&self) -> &[ShardCopy] {
        &self.unassigned
    }

    /// Assigned copies whose node is not in the membership
    pub fn orphaned_copies(&self) -> &[ShardCopy] {
        &self.orphaned
    }

    /// Account for a copy the engine just placed on `copy.node_id()`.
    pub(crate) fn record_initializing(&mut self, copy: &ShardCopy) {
        if let Some(node) = copy.node_id().and_then(|id| self.nodes.get_mut(id)) {
            node.copies.push(copy.clone());
        }
        self.unassigned.retain(|c| c.id() != copy.id());
    }

    /// Account for a copy the engine just started moving.
    pub(crate) fn record_relocation(&mut self, copy: &ShardCopy) {
        if let Some(source) = copy.node_id().and_then(|id| self.nodes.get_mut(id)) {
            if let Some(slot) = source.copies.iter_mut().find(|c| c.id() == copy.id()) {
                *slot = copy.clone();
            }
        }
        if let Some(target) = copy.relocating_to().and_then(|id| self.nodes.get_mut(id)) {
            target.incoming.push(copy.clone());
        }
    }
}
