//! Shard copies: one primary or replica slot of one shard
//!
//! A `ShardCopy` is a value. State transitions never edit a copy in place;
//! they return the next value, and the routing table builder swaps it in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a cluster node
pub type NodeId = String;

/// Identifier of an index
pub type IndexId = String;

/// Shard number inside an index, in `[0, shard_count)`
pub type ShardId = u32;

/// Stable name of one copy slot: `(index, shard, copy_index)`.
///
/// Copy indices are handed out by the owning group and never reused, so an
/// id keeps naming the same slot for as long as that slot exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CopyId {
    pub index: IndexId,
    pub shard_id: ShardId,
    pub copy_index: u32,
}

impl CopyId {
    pub fn new(index: impl Into<IndexId>, shard_id: ShardId, copy_index: u32) -> Self {
        Self {
            index: index.into(),
            shard_id,
            copy_index,
        }
    }
}

impl fmt::Display for CopyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}][{}]", self.index, self.shard_id, self.copy_index)
    }
}

/// Lifecycle state of a shard copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
}

impl ShardState {
    /// Bound to a node?
    pub fn is_assigned(&self) -> bool {
        !matches!(self, ShardState::Unassigned)
    }

    /// Holds a complete copy of the data?
    pub fn is_active(&self) -> bool {
        matches!(self, ShardState::Started | ShardState::Relocating)
    }

    /// Order in which replicas are dropped when the replica count shrinks.
    pub(crate) fn removal_rank(&self) -> u8 {
        match self {
            ShardState::Unassigned => 0,
            ShardState::Initializing => 1,
            ShardState::Relocating => 2,
            ShardState::Started => 3,
        }
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardState::Unassigned => write!(f, "UNASSIGNED"),
            ShardState::Initializing => write!(f, "INITIALIZING"),
            ShardState::Started => write!(f, "STARTED"),
            ShardState::Relocating => write!(f, "RELOCATING"),
        }
    }
}

/// Why a copy is unassigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedReason {
    IndexCreated,
    ReplicaAdded,
    NodeLeft,
    Failed,
}

impl fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnassignedReason::IndexCreated => write!(f, "index_created"),
            UnassignedReason::ReplicaAdded => write!(f, "replica_added"),
            UnassignedReason::NodeLeft => write!(f, "node_left"),
            UnassignedReason::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of the last placement attempt for an unassigned copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// No node passes the placement rules
    NoEligibleNode,
    /// Eligible nodes exist but all are at their recovery limit
    Throttled,
    /// Replica waiting for its primary to start
    AwaitingPrimary,
    /// Allocation is disabled for this kind of copy
    AllocationDisabled,
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationStatus::NoEligibleNode => write!(f, "no_eligible_node"),
            AllocationStatus::Throttled => write!(f, "throttled"),
            AllocationStatus::AwaitingPrimary => write!(f, "awaiting_primary"),
            AllocationStatus::AllocationDisabled => write!(f, "allocation_disabled"),
        }
    }
}

/// One physical assignment (primary or replica) of one shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCopy {
    index: IndexId,
    shard_id: ShardId,
    copy_index: u32,
    primary: bool,
    state: ShardState,
    node_id: Option<NodeId>,
    relocating_to: Option<NodeId>,
    unassigned_reason: Option<UnassignedReason>,
    allocation_status: Option<AllocationStatus>,
}

impl ShardCopy {
    pub(crate) fn new_unassigned(
        index: impl Into<IndexId>,
        shard_id: ShardId,
        copy_index: u32,
        primary: bool,
        reason: UnassignedReason,
    ) -> Self {
        Self {
            index: index.into(),
            shard_id,
            copy_index,
            primary,
            state: ShardState::Unassigned,
            node_id: None,
            relocating_to: None,
            unassigned_reason: Some(reason),
            allocation_status: None,
        }
    }

    pub fn id(&self) -> CopyId {
        CopyId::new(self.index.clone(), self.shard_id, self.copy_index)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn copy_index(&self) -> u32 {
        self.copy_index
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn state(&self) -> ShardState {
        self.state
    }

    /// Node currently hosting the copy (the source node while relocating)
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn relocating_to(&self) -> Option<&str> {
        self.relocating_to.as_deref()
    }

    pub fn unassigned_reason(&self) -> Option<UnassignedReason> {
        self.unassigned_reason
    }

    pub fn allocation_status(&self) -> Option<AllocationStatus> {
        self.allocation_status
    }

    pub fn is_unassigned(&self) -> bool {
        self.state == ShardState::Unassigned
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Is this copy on `node`, either hosted or arriving by relocation?
    pub fn occupies(&self, node: &str) -> bool {
        self.node_id() == Some(node) || self.relocating_to() == Some(node)
    }

    // === Transitions ===

    /// UNASSIGNED -> INITIALIZING on `node`
    pub(crate) fn initialize(&self, node: &str) -> Self {
        debug_assert_eq!(self.state, ShardState::Unassigned);
        Self {
            state: ShardState::Initializing,
            node_id: Some(node.to_string()),
            relocating_to: None,
            unassigned_reason: None,
            allocation_status: None,
            ..self.clone()
        }
    }

    /// INITIALIZING -> STARTED, or RELOCATING -> STARTED on the target node
    pub(crate) fn start(&self) -> Self {
        match self.state {
            ShardState::Initializing => Self {
                state: ShardState::Started,
                ..self.clone()
            },
            ShardState::Relocating => Self {
                state: ShardState::Started,
                node_id: self.relocating_to.clone(),
                relocating_to: None,
                ..self.clone()
            },
            _ => self.clone(),
        }
    }

    /// STARTED -> RELOCATING towards `target`
    pub(crate) fn relocate(&self, target: &str) -> Self {
        debug_assert_eq!(self.state, ShardState::Started);
        Self {
            state: ShardState::Relocating,
            relocating_to: Some(target.to_string()),
            ..self.clone()
        }
    }

    /// RELOCATING -> STARTED on the source node
    pub(crate) fn cancel_relocation(&self) -> Self {
        debug_assert_eq!(self.state, ShardState::Relocating);
        Self {
            state: ShardState::Started,
            relocating_to: None,
            ..self.clone()
        }
    }

    /// any assigned state -> UNASSIGNED
    pub(crate) fn unassign(&self, reason: UnassignedReason) -> Self {
        Self {
            state: ShardState::Unassigned,
            node_id: None,
            relocating_to: None,
            unassigned_reason: Some(reason),
            allocation_status: None,
            ..self.clone()
        }
    }

    pub(crate) fn with_allocation_status(&self, status: AllocationStatus) -> Self {
        Self {
            allocation_status: Some(status),
            ..self.clone()
        }
    }

    /// Field-level invariants of a single copy.
    pub(crate) fn check(&self) -> Option<String> {
        let id = self.id();
        if self.state.is_assigned() != self.node_id.is_some() {
            return Some(format!("{} is {} with node {:?}", id, self.state, self.node_id));
        }
        if (self.state == ShardState::Relocating) != self.relocating_to.is_some() {
            return Some(format!(
                "{} is {} with relocation target {:?}",
                id, self.state, self.relocating_to
            ));
        }
        if self.state.is_assigned() == self.unassigned_reason.is_some() {
            return Some(format!(
                "{} is {} with unassigned reason {:?}",
                id, self.state, self.unassigned_reason
            ));
        }
        if self.relocating_to.is_some() && self.relocating_to == self.node_id {
            return Some(format!("{} relocates onto its own node", id));
        }
        None
    }
}

impl fmt::Display for ShardCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.primary { "P" } else { "R" };
        write!(f, "{}[{}] {}", self.id(), role, self.state)?;
        if let Some(node) = &self.node_id {
            write!(f, " on {}", node)?;
        }
        if let Some(target) = &self.relocating_to {
            write!(f, " -> {}", target)?;
        }
        Ok(())
    }
}
