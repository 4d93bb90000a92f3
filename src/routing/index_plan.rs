//! Routing plan of one index

use super::shard_copy::{IndexId, ShardCopy, ShardId, UnassignedReason};
use super::shard_group::ShardGroup;
use crate::cluster::ReplicationConfig;
use serde::{Deserialize, Serialize};

/// One `ShardGroup` per shard id in `[0, shard_count)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoutingPlan {
    index: IndexId,
    shards: Vec<ShardGroup>,
}

impl IndexRoutingPlan {
    pub(crate) fn new_unassigned(index: &str, config: &ReplicationConfig) -> Self {
        let shards = (0..config.shard_count)
            .map(|shard_id| {
                ShardGroup::new_unassigned(
                    index,
                    shard_id,
                    config.replica_count,
                    UnassignedReason::IndexCreated,
                )
            })
            .collect();
        Self {
            index: index.to_string(),
            shards,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Replica count as carried by the groups themselves
    pub fn replica_count(&self) -> usize {
        self.shards.first().map(|g| g.size() - 1).unwrap_or(0)
    }

    pub fn shards(&self) -> &[ShardGroup] {
        &self.shards
    }

    pub fn shard(&self, shard_id: ShardId) -> Option<&ShardGroup> {
        self.shards.get(shard_id as usize)
    }

    pub(crate) fn shard_mut(&mut self, shard_id: ShardId) -> Option<&mut ShardGroup> {
        self.shards.get_mut(shard_id as usize)
    }

    pub fn copies(&self) -> impl Iterator<Item = &ShardCopy> {
        self.shards.iter().flat_map(|g| g.copies().iter())
    }

    pub(crate) fn set_replica_count(&mut self, replicas: u32) -> bool {
        let mut changed = false;
        for group in &mut self.shards {
            changed |= group.set_replica_count(replicas);
        }
        changed
    }

    pub(crate) fn check(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for (position, group) in self.shards.iter().enumerate() {
            if group.shard_id() as usize != position || group.index() != self.index {
                violations.push(format!(
                    "[{}] slot {} holds group [{}][{}]",
                    self.index,
                    position,
                    group.index(),
                    group.shard_id()
                ));
            }
            violations.extend(group.check());
        }
        violations
    }
}
