//! # shardroute
//!
//! Shard allocation and routing-table state machine for a replicated,
//! sharded cluster:
//! - Deterministic placement of primaries and replicas onto nodes
//! - Copy lifecycle (unassigned, initializing, started, relocating)
//! - Replica count changes with minimal churn
//! - Identity-based no-op detection so unchanged tables are never republished
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ClusterSnapshot (vN)           │
//! │   Metadata  │  RoutingTable  │  NodeSet      │
//! └──────┬──────────────┬───────────────┬────────┘
//!        │              │               │
//!        │      ┌───────▼────────┐      │
//!        └─────►│AllocationEngine│◄─────┘
//!               │ reroute        │
//!               │ apply_started  │◄──── recovery events
//!               │ apply_failed   │
//!               └───────┬────────┘
//!                       │ new Arc<RoutingTable> (or the same one)
//!               ┌───────▼────────┐
//!               │ClusterSnapshot │ ───► publication layer
//!               │    (vN+1)      │
//!               └────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```
//! use shardroute::cluster::{ClusterSnapshot, NodeDescriptor, NodeSet, ReplicationConfig};
//! use shardroute::routing::ShardState;
//! use shardroute::AllocationEngine;
//!
//! let mut nodes = NodeSet::builder(&NodeSet::empty());
//! nodes.add(NodeDescriptor::new("node-1")).add(NodeDescriptor::new("node-2"));
//!
//! let snapshot = ClusterSnapshot::empty()
//!     .create_index("logs", ReplicationConfig::new(1, 1))?
//!     .with_nodes(nodes.build());
//!
//! let engine = AllocationEngine::default();
//! let snapshot = engine.reroute(&snapshot).apply_to(&snapshot);
//!
//! let recovering: Vec<_> = snapshot
//!     .routing_table()
//!     .copies_with_state(ShardState::Initializing)
//!     .iter()
//!     .map(|c| c.id())
//!     .collect();
//! let snapshot = engine.apply_started(&snapshot, &recovering).apply_to(&snapshot);
//! assert_eq!(snapshot.routing_table().copies_with_state(ShardState::Started).len(), 1);
//! # Ok::<(), shardroute::Error>(())
//! ```

pub mod allocation;
pub mod cluster;
pub mod common;
pub mod routing;

// Re-export commonly used types
pub use allocation::{AllocationEngine, RoutingAllocationResult};
pub use cluster::ClusterSnapshot;
pub use common::{AllocationSettings, Config, Error, Result};
pub use routing::{CopyId, RoutingTable, ShardCopy, ShardState};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
