//! Utility types for shardroute

use serde::{Deserialize, Serialize};

/// Node health state, as reported by the membership layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Alive,
    Suspect,
    Dead,
    Draining,
}

impl NodeState {
    /// Can new shard copies be placed on this node?
    pub fn can_allocate(&self) -> bool {
        matches!(self, NodeState::Alive)
    }

    /// Does this node keep the copies it already hosts?
    pub fn retains_copies(&self) -> bool {
        !matches!(self, NodeState::Dead)
    }

    /// Should started copies be moved off this node?
    pub fn is_draining(&self) -> bool {
        matches!(self, NodeState::Draining)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Alive => write!(f, "alive"),
            NodeState::Suspect => write!(f, "suspect"),
            NodeState::Dead => write!(f, "dead"),
            NodeState::Draining => write!(f, "draining"),
        }
    }
}
