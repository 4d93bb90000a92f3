//! The primary and replicas of one shard

use super::shard_copy::{IndexId, ShardCopy, ShardId, ShardState, UnassignedReason};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// All copies of one shard id.
///
/// The primary always sits at position 0; replicas follow in creation order.
/// Deserialization rejects groups that break this layout, so `primary()`
/// never sees an empty group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawShardGroup")]
pub struct ShardGroup {
    index: IndexId,
    shard_id: ShardId,
    copies: Vec<ShardCopy>,
    /// Next copy index handed to a new replica. Never reused.
    next_copy_index: u32,
}

/// Wire form of a `ShardGroup`, validated before use
#[derive(Deserialize)]
struct RawShardGroup {
    index: IndexId,
    shard_id: ShardId,
    copies: Vec<ShardCopy>,
    next_copy_index: u32,
}

impl TryFrom<RawShardGroup> for ShardGroup {
    type Error = String;

    fn try_from(raw: RawShardGroup) -> Result<Self, Self::Error> {
        let group = ShardGroup {
            index: raw.index,
            shard_id: raw.shard_id,
            copies: raw.copies,
            next_copy_index: raw.next_copy_index,
        };
        let violations = group.check();
        if violations.is_empty() {
            Ok(group)
        } else {
            Err(format!("invalid shard group: {}", violations.join("; ")))
        }
    }
}

impl ShardGroup {
    pub(crate) fn new_unassigned(
        index: &str,
        shard_id: ShardId,
        replicas: u32,
        reason: UnassignedReason,
    ) -> Self {
        let copies = (0..=replicas)
            .map(|copy_index| {
                ShardCopy::new_unassigned(index, shard_id, copy_index, copy_index == 0, reason)
            })
            .collect();
        Self {
            index: index.to_string(),
            shard_id,
            copies,
            next_copy_index: replicas + 1,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Number of copies, primary included
    pub fn size(&self) -> usize {
        self.copies.len()
    }

    pub fn copies(&self) -> &[ShardCopy] {
        &self.copies
    }

    pub fn copy(&self, copy_index: u32) -> Option<&ShardCopy> {
        self.copies.iter().find(|c| c.copy_index() == copy_index)
    }

    pub fn primary(&self) -> &ShardCopy {
        &self.copies[0]
    }

    pub fn replicas(&self) -> Vec<&ShardCopy> {
        self.copies[1..].iter().collect()
    }

    pub fn replicas_with_state(&self, state: ShardState) -> Vec<&ShardCopy> {
        self.copies[1..].iter().filter(|c| c.state() == state).collect()
    }

    pub fn active_copies(&self) -> Vec<&ShardCopy> {
        self.copies.iter().filter(|c| c.is_active()).collect()
    }

    /// Does any copy of this shard sit on (or move to) `node`?
    pub fn occupies(&self, node: &str) -> bool {
        self.copies.iter().any(|c| c.occupies(node))
    }

    /// Swap in a new value for an existing slot. Returns true if the slot
    /// existed and the value differed.
    pub(crate) fn replace(&mut self, copy: ShardCopy) -> bool {
        match self
            .copies
            .iter_mut()
            .find(|c| c.copy_index() == copy.copy_index())
        {
            Some(slot) if *slot != copy => {
                *slot = copy;
                true
            }
            _ => false,
        }
    }

    /// Grow or shrink the replica set. Returns true if anything changed.
    pub(crate) fn set_replica_count(&mut self, replicas: u32) -> bool {
        let current = self.copies.len() - 1;
        let target = replicas as usize;

        if target > current {
            for _ in current..target {
                let copy = ShardCopy::new_unassigned(
                    self.index.as_str(),
                    self.shard_id,
                    self.next_copy_index,
                    false,
                    UnassignedReason::ReplicaAdded,
                );
                self.next_copy_index += 1;
                self.copies.push(copy);
            }
            return true;
        }

        if target < current {
            // Cheapest copies go first: unassigned before initializing before
            // active, newest slot first within a state.
            let mut candidates: Vec<(u8, u32)> = self.copies[1..]
                .iter()
                .map(|c| (c.state().removal_rank(), c.copy_index()))
                .collect();
            candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

            let doomed: HashSet<u32> = candidates
                .into_iter()
                .take(current - target)
                .map(|(_, copy_index)| copy_index)
                .collect();
            self.copies
                .retain(|c| c.is_primary() || !doomed.contains(&c.copy_index()));
            return true;
        }

        false
    }

    /// Structural invariants of the group.
    pub(crate) fn check(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let label = format!("[{}][{}]", self.index, self.shard_id);

        let primaries = self.copies.iter().filter(|c| c.is_primary()).count();
        if primaries != 1 {
            violations.push(format!("{} has {} primaries", label, primaries));
        }
        if !self.copies.first().map(|c| c.is_primary()).unwrap_or(false) {
            violations.push(format!("{} primary is not the first slot", label));
        }

        let mut seen_slots = HashSet::new();
        let mut seen_nodes = HashSet::new();
        for copy in &self.copies {
            if copy.index() != self.index || copy.shard_id() != self.shard_id {
                violations.push(format!("{} holds foreign copy {}", label, copy.id()));
            }
            if !seen_slots.insert(copy.copy_index()) {
                violations.push(format!("{} reuses copy index {}", label, copy.copy_index()));
            }
            if copy.copy_index() >= self.next_copy_index {
                violations.push(format!(
                    "{} copy index {} not yet issued",
                    label,
                    copy.copy_index()
                ));
            }
            if let Some(problem) = copy.check() {
                violations.push(problem);
            }
            for node in copy.node_id().into_iter().chain(copy.relocating_to()) {
                if !seen_nodes.insert(node.to_string()) {
                    violations.push(format!("{} has two copies on {}", label, node));
                }
            }
        }
        violations
    }
}
