//! Routing model: shard copies, shard groups, index plans, the routing
//! table and its node-centric view

pub mod index_plan;
pub mod node_view;
pub mod shard_copy;
pub mod shard_group;
pub mod table;

pub use index_plan::IndexRoutingPlan;
pub use node_view::{NodeView, RoutingNode};
pub use shard_copy::{
    AllocationStatus, CopyId, IndexId, NodeId, ShardCopy, ShardId, ShardState, UnassignedReason,
};
pub use shard_group::ShardGroup;
pub use table::{RoutingTable, RoutingTableBuilder};
