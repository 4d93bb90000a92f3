//! Cluster membership

use crate::common::{Error, NodeState, Result};
use crate::routing::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Node descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub state: NodeState,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            address: None,
            state: NodeState::Alive,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }
}

/// Node id -> descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSet {
    nodes: BTreeMap<NodeId, NodeDescriptor>,
}

impl NodeSet {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn builder(nodes: &Arc<NodeSet>) -> NodeSetBuilder {
        NodeSetBuilder::new(Arc::clone(nodes))
    }

    pub fn get(&self, id: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Descriptors in node id order
    pub fn iter(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.keys().map(|id| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds the next `NodeSet`; returns the original when nothing changed.
#[derive(Debug)]
pub struct NodeSetBuilder {
    original: Arc<NodeSet>,
    nodes: BTreeMap<NodeId, NodeDescriptor>,
    dirty: bool,
}

impl NodeSetBuilder {
    pub fn new(original: Arc<NodeSet>) -> Self {
        let nodes = original.nodes.clone();
        Self {
            original,
            nodes,
            dirty: false,
        }
    }

    /// Add or replace a node
    pub fn add(&mut self, node: NodeDescriptor) -> &mut Self {
        if self.nodes.get(&node.id) != Some(&node) {
            tracing::debug!("Node {} joined ({})", node.id, node.state);
            self.nodes.insert(node.id.clone(), node);
            self.dirty = true;
        }
        self
    }

    pub fn remove(&mut self, id: &str) -> &mut Self {
        if self.nodes.remove(id).is_some() {
            tracing::debug!("Node {} left", id);
            self.dirty = true;
        }
        self
    }

    pub fn set_state(&mut self, id: &str, state: NodeState) -> Result<&mut Self> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
        if node.state != state {
            tracing::debug!("Node {} is now {}", id, state);
            node.state = state;
            self.dirty = true;
        }
        Ok(self)
    }

    pub fn build(self) -> Arc<NodeSet> {
        if !self.dirty || self.nodes == self.original.nodes {
            return self.original;
        }
        Arc::new(NodeSet { nodes: self.nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let empty = NodeSet::empty();
        let mut builder = NodeSet::builder(&empty);
        builder
            .add(NodeDescriptor::new("node-2"))
            .add(NodeDescriptor::new("node-1").with_address("10.0.0.1:9300"));
        let nodes = builder.build();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes.node_ids(), vec!["node-1", "node-2"]);
        assert_eq!(
            nodes.get("node-1").unwrap().address.as_deref(),
            Some("10.0.0.1:9300")
        );

        let mut builder = NodeSet::builder(&nodes);
        builder.remove("node-2");
        let smaller = builder.build();
        assert!(!smaller.contains("node-2"));
        assert!(nodes.contains("node-2"));
    }

    #[test]
    fn test_no_change_returns_original() {
        let mut builder = NodeSet::builder(&NodeSet::empty());
        builder.add(NodeDescriptor::new("node-1"));
        let nodes = builder.build();

        let mut builder = NodeSet::builder(&nodes);
        builder.add(NodeDescriptor::new("node-1")).remove("node-9");
        assert!(Arc::ptr_eq(&builder.build(), &nodes));
    }

    #[test]
    fn test_set_state() {
        let mut builder = NodeSet::builder(&NodeSet::empty());
        builder.add(NodeDescriptor::new("node-1"));
        let nodes = builder.build();

        let mut builder = NodeSet::builder(&nodes);
        builder.set_state("node-1", NodeState::Draining).unwrap();
        let drained = builder.build();
        assert_eq!(drained.get("node-1").unwrap().state, NodeState::Draining);

        let mut builder = NodeSet::builder(&nodes);
        assert!(matches!(
            builder.set_state("node-7", NodeState::Dead),
            Err(Error::NodeNotFound(_))
        ));
    }
}
