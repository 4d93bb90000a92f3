//! Shard placement and copy lifecycle transitions

pub mod deciders;
pub mod engine;

pub use deciders::{AllocationDecider, Decision, DecisionContext};
pub use engine::{AllocationEngine, RoutingAllocationResult};
