//! Cluster state: membership, per-index replication settings and the
//! snapshot that ties them to a routing table

pub mod metadata;
pub mod nodes;
pub mod snapshot;

pub use metadata::{Metadata, MetadataBuilder, ReplicationConfig};
pub use nodes::{NodeDescriptor, NodeSet, NodeSetBuilder};
pub use snapshot::{ClusterSnapshot, ClusterSnapshotBuilder};
