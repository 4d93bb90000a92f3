//! Versioned, immutable cluster snapshot

use super::metadata::{Metadata, ReplicationConfig};
use super::nodes::NodeSet;
use crate::common::Result;
use crate::routing::{NodeView, RoutingTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Membership, per-index settings and routing, as one value.
///
/// Cloning is cheap: every component sits behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    version: u64,
    metadata: Arc<Metadata>,
    routing_table: Arc<RoutingTable>,
    nodes: Arc<NodeSet>,
}

impl ClusterSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder(&self) -> ClusterSnapshotBuilder {
        ClusterSnapshotBuilder::new(self.clone())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    pub fn nodes(&self) -> &Arc<NodeSet> {
        &self.nodes
    }

    /// Fresh node-centric view of this snapshot
    pub fn node_view(&self) -> NodeView {
        NodeView::new(&self.routing_table, &self.nodes)
    }

    pub fn with_nodes(&self, nodes: Arc<NodeSet>) -> Self {
        self.builder().nodes(nodes).build()
    }

    pub fn with_routing_table(&self, routing_table: Arc<RoutingTable>) -> Self {
        self.builder().routing_table(routing_table).build()
    }

    /// Register a new index in metadata and routing together.
    pub fn create_index(&self, index: &str, config: ReplicationConfig) -> Result<Self> {
        let mut metadata = Metadata::builder(&self.metadata);
        metadata.create_index(index, config)?;
        let mut routing = RoutingTable::builder(&self.routing_table);
        routing.add_as_new(index, &config)?;

        tracing::info!(
            "Created index {} ({} shards, {} replicas)",
            index,
            config.shard_count,
            config.replica_count
        );
        Ok(self
            .builder()
            .metadata(metadata.build())
            .routing_table(routing.build())
            .build())
    }

    /// Change the replica count in metadata and routing together.
    ///
    /// Growing adds UNASSIGNED replicas for the next reroute; shrinking drops
    /// replicas immediately.
    pub fn update_number_of_replicas(&self, index: &str, replicas: u32) -> Result<Self> {
        let mut metadata = Metadata::builder(&self.metadata);
        metadata.update_number_of_replicas(index, replicas)?;
        let mut routing = RoutingTable::builder(&self.routing_table);
        routing.update_number_of_replicas(index, replicas)?;

        tracing::info!("Updated number of replicas of {} to {}", index, replicas);
        Ok(self
            .builder()
            .metadata(metadata.build())
            .routing_table(routing.build())
            .build())
    }

    /// Drop an index from metadata and routing together.
    pub fn delete_index(&self, index: &str) -> Self {
        let mut metadata = Metadata::builder(&self.metadata);
        metadata.remove_index(index);
        let mut routing = RoutingTable::builder(&self.routing_table);
        routing.remove_index(index);

        self.builder()
            .metadata(metadata.build())
            .routing_table(routing.build())
            .build()
    }
}

/// Assembles the next snapshot from the previous one plus replaced parts.
#[derive(Debug)]
pub struct ClusterSnapshotBuilder {
    base: ClusterSnapshot,
    metadata: Arc<Metadata>,
    routing_table: Arc<RoutingTable>,
    nodes: Arc<NodeSet>,
}

impl ClusterSnapshotBuilder {
    pub fn new(base: ClusterSnapshot) -> Self {
        Self {
            metadata: Arc::clone(&base.metadata),
            routing_table: Arc::clone(&base.routing_table),
            nodes: Arc::clone(&base.nodes),
            base,
        }
    }

    pub fn metadata(mut self, metadata: Arc<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn routing_table(mut self, routing_table: Arc<RoutingTable>) -> Self {
        self.routing_table = routing_table;
        self
    }

    pub fn nodes(mut self, nodes: Arc<NodeSet>) -> Self {
        self.nodes = nodes;
        self
    }

    /// The version moves forward only if some part was replaced.
    pub fn build(self) -> ClusterSnapshot {
        let unchanged = Arc::ptr_eq(&self.metadata, &self.base.metadata)
            && Arc::ptr_eq(&self.routing_table, &self.base.routing_table)
            && Arc::ptr_eq(&self.nodes, &self.base.nodes);
        if unchanged {
            return self.base;
        }
        ClusterSnapshot {
            version: self.base.version + 1,
            metadata: self.metadata,
            routing_table: self.routing_table,
            nodes: self.nodes,
        }
    }
}
