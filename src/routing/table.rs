//! Cluster routing table and its builder
//!
//! A `RoutingTable` is immutable and shared behind an `Arc`. Every change
//! goes through a `RoutingTableBuilder`, which tracks whether anything was
//! actually modified. When nothing was, `build()` hands back the exact
//! `Arc` it started from, so callers can detect a no-op round with
//! `Arc::ptr_eq` and skip republishing.

use super::index_plan::IndexRoutingPlan;
use super::shard_copy::{CopyId, IndexId, ShardCopy, ShardId, ShardState};
use super::shard_group::ShardGroup;
use crate::cluster::ReplicationConfig;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Index id -> routing plan for the whole cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    /// Bumped by one every time a builder produces a new instance
    version: u64,
    indices: BTreeMap<IndexId, Arc<IndexRoutingPlan>>,
}

impl RoutingTable {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a builder on top of `table`
    pub fn builder(table: &Arc<RoutingTable>) -> RoutingTableBuilder {
        RoutingTableBuilder::new(Arc::clone(table))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn index(&self, index: &str) -> Option<&IndexRoutingPlan> {
        self.indices.get(index).map(|plan| plan.as_ref())
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    pub fn indices(&self) -> impl Iterator<Item = &IndexRoutingPlan> {
        self.indices.values().map(|plan| plan.as_ref())
    }

    pub fn shard(&self, index: &str, shard_id: ShardId) -> Option<&ShardGroup> {
        self.index(index).and_then(|plan| plan.shard(shard_id))
    }

    pub fn copy(&self, id: &CopyId) -> Option<&ShardCopy> {
        self.shard(&id.index, id.shard_id)
            .and_then(|group| group.copy(id.copy_index))
    }

    /// Every copy, ordered by index id, shard id, then slot position
    pub fn copies(&self) -> impl Iterator<Item = &ShardCopy> {
        self.indices.values().flat_map(|plan| plan.copies())
    }

    pub fn copies_with_state(&self, state: ShardState) -> Vec<&ShardCopy> {
        self.copies().filter(|c| c.state() == state).collect()
    }

    pub fn unassigned_count(&self) -> usize {
        self.copies().filter(|c| c.is_unassigned()).count()
    }

    /// Every copy of every index is STARTED
    pub fn is_fully_started(&self) -> bool {
        self.copies().all(|c| c.state() == ShardState::Started)
    }

    /// Every structural invariant this table violates; empty when sound.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for (id, plan) in &self.indices {
            if plan.index() != id {
                violations.push(format!("plan {} stored under {}", plan.index(), id));
            }
            violations.extend(plan.check());
        }
        violations
    }
}

/// Transient, mutable view of a routing table under construction
#[derive(Debug)]
pub struct RoutingTableBuilder {
    original: Arc<RoutingTable>,
    indices: BTreeMap<IndexId, Arc<IndexRoutingPlan>>,
    dirty: bool,
}

impl RoutingTableBuilder {
    pub fn new(original: Arc<RoutingTable>) -> Self {
        let indices = original.indices.clone();
        Self {
            original,
            indices,
            dirty: false,
        }
    }

    /// Has any call changed the table so far?
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Add a freshly created index with every copy UNASSIGNED
    pub fn add_as_new(&mut self, index: &str, config: &ReplicationConfig) -> Result<&mut Self> {
        if self.indices.contains_key(index) {
            return Err(Error::IndexAlreadyExists(index.to_string()));
        }
        if config.shard_count == 0 {
            return Err(Error::InvalidShardCount {
                index: index.to_string(),
                count: config.shard_count,
            });
        }
        let plan = IndexRoutingPlan::new_unassigned(index, config);
        self.indices.insert(index.to_string(), Arc::new(plan));
        self.dirty = true;
        Ok(self)
    }

    /// Drop an index and all of its copies. Absent indices are ignored.
    pub fn remove_index(&mut self, index: &str) -> &mut Self {
        if self.indices.remove(index).is_some() {
            self.dirty = true;
        }
        self
    }

    /// Grow or shrink the replica set of every shard of `index`.
    ///
    /// The matching metadata change is the caller's job.
    pub fn update_number_of_replicas(&mut self, index: &str, replicas: u32) -> Result<&mut Self> {
        let plan = self
            .indices
            .get_mut(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        if plan.replica_count() != replicas as usize {
            Arc::make_mut(plan).set_replica_count(replicas);
            self.dirty = true;
        }
        Ok(self)
    }

    pub fn copy(&self, id: &CopyId) -> Option<&ShardCopy> {
        self.indices
            .get(&id.index)
            .and_then(|plan| plan.shard(id.shard_id))
            .and_then(|group| group.copy(id.copy_index))
    }

    pub fn shard(&self, index: &str, shard_id: ShardId) -> Option<&ShardGroup> {
        self.indices.get(index).and_then(|plan| plan.shard(shard_id))
    }

    /// Current state of every copy, in table order
    pub fn copies(&self) -> impl Iterator<Item = &ShardCopy> {
        self.indices.values().flat_map(|plan| plan.copies())
    }

    /// Replace the slot named by `copy.id()` with `copy`.
    ///
    /// Returns false, and leaves the builder clean, when the slot does not
    /// exist or already holds an equal value.
    pub(crate) fn update_copy(&mut self, copy: ShardCopy) -> bool {
        let unchanged = match self.copy(&copy.id()) {
            Some(current) => *current == copy,
            None => return false,
        };
        if unchanged {
            return false;
        }

        let replaced = self
            .indices
            .get_mut(copy.index())
            .and_then(|plan| Arc::make_mut(plan).shard_mut(copy.shard_id()))
            .map(|group| group.replace(copy))
            .unwrap_or(false);
        self.dirty |= replaced;
        replaced
    }

    /// Finish. Returns the original instance if nothing changed.
    pub fn build(self) -> Arc<RoutingTable> {
        if !self.dirty || self.indices == self.original.indices {
            return self.original;
        }
        Arc::new(RoutingTable {
            version: self.original.version + 1,
            indices: self.indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(index: &str, shards: u32, replicas: u32) -> Arc<RoutingTable> {
        let mut builder = RoutingTable::builder(&RoutingTable::empty());
        builder
            .add_as_new(index, &ReplicationConfig::new(shards, replicas))
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_add_as_new() {
        let table = table_with("logs", 2, 1);
        assert_eq!(table.version(), 1);
        let plan = table.index("logs").unwrap();
        assert_eq!(plan.shard_count(), 2);
        assert_eq!(plan.shard(0).unwrap().size(), 2);
        assert_eq!(table.unassigned_count(), 4);
        assert!(table.check_invariants().is_empty());
    }

    #[test]
    fn test_add_duplicate_index() {
        let table = table_with("logs", 1, 0);
        let mut builder = RoutingTable::builder(&table);
        let result = builder.add_as_new("logs", &ReplicationConfig::new(1, 0));
        assert!(matches!(result, Err(Error::IndexAlreadyExists(_))));
        assert!(Arc::ptr_eq(&builder.build(), &table));
    }

    #[test]
    fn test_zero_shards_rejected() {
        let mut builder = RoutingTable::builder(&RoutingTable::empty());
        let result = builder.add_as_new("logs", &ReplicationConfig::new(0, 1));
        assert!(matches!(result, Err(Error::InvalidShardCount { .. })));
    }

    #[test]
    fn test_build_without_changes_returns_original() {
        let table = table_with("logs", 1, 1);
        let builder = RoutingTable::builder(&table);
        assert!(Arc::ptr_eq(&builder.build(), &table));
    }

    #[test]
    fn test_same_replica_count_returns_original() {
        let table = table_with("logs", 1, 1);
        let mut builder = RoutingTable::builder(&table);
        builder.update_number_of_replicas("logs", 1).unwrap();
        assert!(!builder.is_dirty());
        assert!(Arc::ptr_eq(&builder.build(), &table));
    }

    #[test]
    fn test_update_replicas_unknown_index() {
        let mut builder = RoutingTable::builder(&RoutingTable::empty());
        let result = builder.update_number_of_replicas("missing", 2);
        assert!(matches!(result, Err(Error::IndexNotFound(_))));
    }

    #[test]
    fn test_update_replicas_changes_table() {
        let table = table_with("logs", 2, 1);
        let mut builder = RoutingTable::builder(&table);
        builder.update_number_of_replicas("logs", 2).unwrap();
        let grown = builder.build();

        assert!(!Arc::ptr_eq(&grown, &table));
        assert_eq!(grown.version(), table.version() + 1);
        assert_eq!(grown.index("logs").unwrap().replica_count(), 2);
        // the original is untouched
        assert_eq!(table.index("logs").unwrap().replica_count(), 1);
    }

    #[test]
    fn test_update_copy_equal_value_stays_clean() {
        let table = table_with("logs", 1, 0);
        let mut builder = RoutingTable::builder(&table);
        let primary = builder.copy(&CopyId::new("logs", 0, 0)).cloned().unwrap();
        assert!(!builder.update_copy(primary));
        assert!(!builder.is_dirty());
    }

    #[test]
    fn test_update_copy_unknown_slot() {
        let table = table_with("logs", 1, 0);
        let mut builder = RoutingTable::builder(&table);
        let stray = table_with("other", 1, 0)
            .copy(&CopyId::new("other", 0, 0))
            .cloned()
            .unwrap();
        assert!(!builder.update_copy(stray));
    }

    #[test]
    fn test_update_copy_shares_untouched_plans() {
        let mut builder = RoutingTable::builder(&table_with("logs", 1, 0));
        builder
            .add_as_new("metrics", &ReplicationConfig::new(1, 0))
            .unwrap();
        let table = builder.build();

        let mut builder = RoutingTable::builder(&table);
        let primary = table.copy(&CopyId::new("logs", 0, 0)).unwrap();
        assert!(builder.update_copy(primary.initialize("node-1")));
        let next = builder.build();

        assert!(Arc::ptr_eq(
            &table.indices["metrics"],
            &next.indices["metrics"]
        ));
        assert_eq!(
            next.copy(&CopyId::new("logs", 0, 0)).unwrap().state(),
            ShardState::Initializing
        );
    }

    #[test]
    fn test_remove_index() {
        let table = table_with("logs", 1, 0);
        let mut builder = RoutingTable::builder(&table);
        builder.remove_index("missing");
        assert!(!builder.is_dirty());
        builder.remove_index("logs");
        let next = builder.build();
        assert!(!next.has_index("logs"));
        assert_eq!(next.copies().count(), 0);
    }

    #[test]
    fn test_grow_then_shrink_in_one_builder() {
        let table = table_with("logs", 1, 1);
        let mut builder = RoutingTable::builder(&table);
        builder.update_number_of_replicas("logs", 3).unwrap();
        builder.update_number_of_replicas("logs", 1).unwrap();
        let next = builder.build();
        assert_eq!(next.shard("logs", 0).unwrap().size(), 2);
        assert_eq!(
            next.shard("logs", 0).unwrap().primary(),
            table.shard("logs", 0).unwrap().primary()
        );
    }
}
