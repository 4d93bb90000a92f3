//! Placement rules
//!
//! Each decider answers two questions: may this copy be placed at all, and
//! may it be placed on this particular node. The engine combines the
//! answers of every decider; the most restrictive one wins.

use crate::common::{AllocationSettings, EnableAllocation};
use crate::routing::{AllocationStatus, RoutingNode, ShardCopy, UnassignedReason};

/// Answer of one decider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    /// Allowed, but not right now
    Throttle,
    No,
}

impl Decision {
    /// Keep the more restrictive of two answers
    pub fn merge(self, other: Decision) -> Decision {
        match (self, other) {
            (Decision::No, _) | (_, Decision::No) => Decision::No,
            (Decision::Throttle, _) | (_, Decision::Throttle) => Decision::Throttle,
            _ => Decision::Yes,
        }
    }
}

/// Inputs shared by every decider during one placement attempt
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub settings: &'a AllocationSettings,
    /// Whether the primary of the copy's shard is STARTED or RELOCATING
    pub primary_active: bool,
}

pub trait AllocationDecider: Send + Sync {
    fn name(&self) -> &'static str;

    /// May `copy` be placed anywhere? `Err` carries the status to record.
    fn can_allocate_copy(
        &self,
        _copy: &ShardCopy,
        _ctx: &DecisionContext<'_>,
    ) -> Result<(), AllocationStatus> {
        Ok(())
    }

    /// May `copy` be placed on `node`?
    fn can_allocate(
        &self,
        _copy: &ShardCopy,
        _node: &RoutingNode,
        _ctx: &DecisionContext<'_>,
    ) -> Decision {
        Decision::Yes
    }
}

/// Only nodes in `Alive` state take new copies
pub struct NodeStateDecider;

impl AllocationDecider for NodeStateDecider {
    fn name(&self) -> &'static str {
        "node_state"
    }

    fn can_allocate(
        &self,
        _copy: &ShardCopy,
        node: &RoutingNode,
        _ctx: &DecisionContext<'_>,
    ) -> Decision {
        if node.descriptor().state.can_allocate() {
            Decision::Yes
        } else {
            Decision::No
        }
    }
}

/// Never two copies of the same shard on one node
pub struct SameShardDecider;

impl AllocationDecider for SameShardDecider {
    fn name(&self) -> &'static str {
        "same_shard"
    }

    fn can_allocate(
        &self,
        copy: &ShardCopy,
        node: &RoutingNode,
        _ctx: &DecisionContext<'_>,
    ) -> Decision {
        if node.hosts_shard(copy.index(), copy.shard_id()) {
            Decision::No
        } else {
            Decision::Yes
        }
    }
}

/// Caps concurrent recoveries per node
pub struct ThrottlingDecider;

impl AllocationDecider for ThrottlingDecider {
    fn name(&self) -> &'static str {
        "throttling"
    }

    fn can_allocate(
        &self,
        _copy: &ShardCopy,
        node: &RoutingNode,
        ctx: &DecisionContext<'_>,
    ) -> Decision {
        if node.initializing_count() < ctx.settings.node_concurrent_recoveries {
            Decision::Yes
        } else {
            Decision::Throttle
        }
    }
}

/// Replicas recover from an active primary, so they wait for it
pub struct ReplicaAfterPrimaryActiveDecider;

impl AllocationDecider for ReplicaAfterPrimaryActiveDecider {
    fn name(&self) -> &'static str {
        "replica_after_primary_active"
    }

    fn can_allocate_copy(
        &self,
        copy: &ShardCopy,
        ctx: &DecisionContext<'_>,
    ) -> Result<(), AllocationStatus> {
        if copy.is_primary() || ctx.primary_active {
            Ok(())
        } else {
            Err(AllocationStatus::AwaitingPrimary)
        }
    }
}

/// Honors the `enable` setting
pub struct EnableAllocationDecider;

impl AllocationDecider for EnableAllocationDecider {
    fn name(&self) -> &'static str {
        "enable"
    }

    fn can_allocate_copy(
        &self,
        copy: &ShardCopy,
        ctx: &DecisionContext<'_>,
    ) -> Result<(), AllocationStatus> {
        let allowed = match ctx.settings.enable {
            EnableAllocation::All => true,
            EnableAllocation::Primaries => copy.is_primary(),
            EnableAllocation::NewPrimaries => {
                copy.is_primary()
                    && copy.unassigned_reason() == Some(UnassignedReason::IndexCreated)
            }
            EnableAllocation::None => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(AllocationStatus::AllocationDisabled)
        }
    }
}

/// The rule set the engine runs with unless told otherwise
pub fn default_deciders() -> Vec<Box<dyn AllocationDecider>> {
    vec![
        Box::new(EnableAllocationDecider),
        Box::new(ReplicaAfterPrimaryActiveDecider),
        Box::new(NodeStateDecider),
        Box::new(SameShardDecider),
        Box::new(ThrottlingDecider),
    ]
}
