//! Replica count changes driven through reroute and started events

use shardroute::cluster::{ClusterSnapshot, NodeDescriptor, NodeSet, ReplicationConfig};
use shardroute::common::AllocationSettings;
use shardroute::routing::{CopyId, ShardState, UnassignedReason};
use shardroute::AllocationEngine;
use std::sync::Arc;

fn initializing(snapshot: &ClusterSnapshot) -> Vec<CopyId> {
    snapshot
        .routing_table()
        .copies_with_state(ShardState::Initializing)
        .iter()
        .map(|c| c.id())
        .collect()
}

fn add_nodes(snapshot: &ClusterSnapshot, ids: &[&str]) -> ClusterSnapshot {
    let mut nodes = NodeSet::builder(snapshot.nodes());
    for id in ids {
        nodes.add(NodeDescriptor::new(*id));
    }
    snapshot.with_nodes(nodes.build())
}

#[test]
fn test_update_number_of_replicas() {
    let engine =
        AllocationEngine::new(AllocationSettings::default().with_concurrent_recoveries(10));

    // Building initial routing table
    let snapshot = ClusterSnapshot::empty()
        .create_index("test", ReplicationConfig::new(1, 1))
        .unwrap();
    let table = snapshot.routing_table();
    assert_eq!(table.index("test").unwrap().shard_count(), 1);
    let group = table.shard("test", 0).unwrap();
    assert_eq!(group.size(), 2);
    assert!(group.copies().iter().all(|c| c.state() == ShardState::Unassigned));
    assert!(group.copies().iter().all(|c| c.node_id().is_none()));

    // Adding two nodes and performing rerouting
    let snapshot = add_nodes(&snapshot, &["node1", "node2"]);
    let snapshot = engine.reroute(&snapshot).apply_to(&snapshot);

    // Start all the primary shards
    let snapshot = engine
        .apply_started(&snapshot, &initializing(&snapshot))
        .apply_to(&snapshot);

    // Start all the replica shards
    let prev = Arc::clone(snapshot.routing_table());
    let snapshot = engine
        .apply_started(&snapshot, &initializing(&snapshot))
        .apply_to(&snapshot);
    let table = snapshot.routing_table();
    assert!(!Arc::ptr_eq(&prev, table));

    let group = table.shard("test", 0).unwrap();
    let node_holding_primary = group.primary().node_id().unwrap().to_string();
    let node_holding_replica = group.replicas()[0].node_id().unwrap().to_string();
    assert_ne!(node_holding_primary, node_holding_replica);
    assert!(["node1", "node2"].contains(&node_holding_primary.as_str()));
    assert!(["node1", "node2"].contains(&node_holding_replica.as_str()));
    assert_eq!(group.size(), 2);
    assert_eq!(group.primary().state(), ShardState::Started);
    assert_eq!(group.replicas().len(), 1);
    assert_eq!(group.replicas()[0].state(), ShardState::Started);

    // Add another replica
    let prev = Arc::clone(snapshot.routing_table());
    let snapshot = snapshot.update_number_of_replicas("test", 2).unwrap();
    assert_eq!(snapshot.metadata().index("test").unwrap().replica_count, 2);
    let table = snapshot.routing_table();
    assert!(!Arc::ptr_eq(&prev, table));

    let group = table.shard("test", 0).unwrap();
    assert_eq!(group.size(), 3);
    assert_eq!(group.primary().state(), ShardState::Started);
    assert_eq!(group.primary().node_id(), Some(node_holding_primary.as_str()));
    assert_eq!(group.replicas().len(), 2);
    assert_eq!(group.replicas()[0].state(), ShardState::Started);
    assert_eq!(group.replicas()[0].node_id(), Some(node_holding_replica.as_str()));
    assert_eq!(group.replicas()[1].state(), ShardState::Unassigned);
    assert_eq!(
        group.replicas()[1].unassigned_reason(),
        Some(UnassignedReason::ReplicaAdded)
    );

    // Add another node and start the added replica
    let snapshot = add_nodes(&snapshot, &["node3"]);
    let prev = Arc::clone(snapshot.routing_table());
    let snapshot = engine.reroute(&snapshot).apply_to(&snapshot);
    let table = snapshot.routing_table();
    assert!(!Arc::ptr_eq(&prev, table));

    let group = table.shard("test", 0).unwrap();
    assert_eq!(group.size(), 3);
    assert_eq!(group.primary().state(), ShardState::Started);
    assert_eq!(group.primary().node_id(), Some(node_holding_primary.as_str()));
    let started = group.replicas_with_state(ShardState::Started);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].node_id(), Some(node_holding_replica.as_str()));
    let recovering = group.replicas_with_state(ShardState::Initializing);
    assert_eq!(recovering.len(), 1);
    assert_eq!(recovering[0].node_id(), Some("node3"));

    let prev = Arc::clone(snapshot.routing_table());
    let snapshot = engine
        .apply_started(&snapshot, &initializing(&snapshot))
        .apply_to(&snapshot);
    let table = snapshot.routing_table();
    assert!(!Arc::ptr_eq(&prev, table));

    let group = table.shard("test", 0).unwrap();
    assert_eq!(group.size(), 3);
    assert_eq!(group.primary().state(), ShardState::Started);
    assert_eq!(group.primary().node_id(), Some(node_holding_primary.as_str()));
    let started = group.replicas_with_state(ShardState::Started);
    assert_eq!(started.len(), 2);
    for replica in &started {
        let node = replica.node_id().unwrap();
        assert!(node == node_holding_replica || node == "node3");
    }
    let mut hosts: Vec<_> = group.copies().iter().map(|c| c.node_id().unwrap()).collect();
    hosts.sort();
    assert_eq!(hosts, vec!["node1", "node2", "node3"]);

    // Now remove a replica
    let prev = Arc::clone(snapshot.routing_table());
    let snapshot = snapshot.update_number_of_replicas("test", 1).unwrap();
    assert_eq!(snapshot.metadata().index("test").unwrap().replica_count, 1);
    let table = snapshot.routing_table();
    assert!(!Arc::ptr_eq(&prev, table));

    let group = table.shard("test", 0).unwrap();
    assert_eq!(group.size(), 2);
    assert_eq!(group.primary().state(), ShardState::Started);
    assert_eq!(group.primary().node_id(), Some(node_holding_primary.as_str()));
    assert_eq!(group.replicas().len(), 1);
    assert_eq!(group.replicas()[0].state(), ShardState::Started);
    let node = group.replicas()[0].node_id().unwrap();
    assert!(node == node_holding_replica || node == "node3");

    // Do a reroute, should remain the same
    let prev = Arc::clone(snapshot.routing_table());
    let result = engine.reroute(&snapshot);
    assert!(!result.changed);
    assert!(Arc::ptr_eq(&prev, &result.routing_table));
    assert_eq!(result.apply_to(&snapshot).version(), snapshot.version());
}

#[test]
fn test_replica_round_trip_keeps_primary() {
    let engine = AllocationEngine::default();
    let snapshot = ClusterSnapshot::empty()
        .create_index("test", ReplicationConfig::new(3, 1))
        .unwrap();
    let snapshot = add_nodes(&snapshot, &["a", "b", "c", "d"]);

    let mut snapshot = engine.reroute(&snapshot).apply_to(&snapshot);
    while !snapshot.routing_table().is_fully_started() {
        snapshot = engine
            .apply_started(&snapshot, &initializing(&snapshot))
            .apply_to(&snapshot);
    }
    let primaries: Vec<_> = snapshot
        .routing_table()
        .index("test")
        .unwrap()
        .shards()
        .iter()
        .map(|g| g.primary().clone())
        .collect();

    let grown = snapshot.update_number_of_replicas("test", 3).unwrap();
    let grown = engine.reroute(&grown).apply_to(&grown);
    let back = grown.update_number_of_replicas("test", 1).unwrap();

    let plan = back.routing_table().index("test").unwrap();
    for (group, primary) in plan.shards().iter().zip(&primaries) {
        assert_eq!(group.size(), 2);
        assert_eq!(group.primary(), primary);
        // the newly added replicas were the cheapest to drop
        assert_eq!(group.replicas()[0].state(), ShardState::Started);
    }
    assert!(back.routing_table().check_invariants().is_empty());
}
