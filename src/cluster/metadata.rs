//! Per-index replication settings

use crate::common::{Error, Result};
use crate::routing::IndexId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shard and replica count of one index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Fixed at index creation
    pub shard_count: u32,
    pub replica_count: u32,
}

impl ReplicationConfig {
    pub fn new(shard_count: u32, replica_count: u32) -> Self {
        Self {
            shard_count,
            replica_count,
        }
    }

    /// Copies per shard, primary included
    pub fn copies_per_shard(&self) -> u32 {
        self.replica_count + 1
    }
}

/// Index id -> replication settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    indices: BTreeMap<IndexId, ReplicationConfig>,
}

impl Metadata {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn builder(metadata: &Arc<Metadata>) -> MetadataBuilder {
        MetadataBuilder::new(Arc::clone(metadata))
    }

    pub fn index(&self, index: &str) -> Option<&ReplicationConfig> {
        self.indices.get(index)
    }

    pub fn indices(&self) -> impl Iterator<Item = (&str, &ReplicationConfig)> {
        self.indices.iter().map(|(id, config)| (id.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Builds the next `Metadata`; returns the original when nothing changed.
#[derive(Debug)]
pub struct MetadataBuilder {
    original: Arc<Metadata>,
    indices: BTreeMap<IndexId, ReplicationConfig>,
    dirty: bool,
}

impl MetadataBuilder {
    pub fn new(original: Arc<Metadata>) -> Self {
        let indices = original.indices.clone();
        Self {
            original,
            indices,
            dirty: false,
        }
    }

    pub fn create_index(&mut self, index: &str, config: ReplicationConfig) -> Result<&mut Self> {
        if self.indices.contains_key(index) {
            return Err(Error::IndexAlreadyExists(index.to_string()));
        }
        if config.shard_count == 0 {
            return Err(Error::InvalidShardCount {
                index: index.to_string(),
                count: config.shard_count,
            });
        }
        self.indices.insert(index.to_string(), config);
        self.dirty = true;
        Ok(self)
    }

    pub fn remove_index(&mut self, index: &str) -> &mut Self {
        if self.indices.remove(index).is_some() {
            self.dirty = true;
        }
        self
    }

    /// Change the replica count of `index`.
    ///
    /// The matching routing table change is the caller's job.
    pub fn update_number_of_replicas(&mut self, index: &str, replicas: u32) -> Result<&mut Self> {
        let config = self
            .indices
            .get_mut(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        if config.replica_count != replicas {
            config.replica_count = replicas;
            self.dirty = true;
        }
        Ok(self)
    }

    pub fn build(self) -> Arc<Metadata> {
        if !self.dirty || self.indices == self.original.indices {
            return self.original;
        }
        Arc::new(Metadata {
            indices: self.indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_update() {
        let mut builder = Metadata::builder(&Metadata::empty());
        builder
            .create_index("logs", ReplicationConfig::new(3, 1))
            .unwrap();
        let metadata = builder.build();
        assert_eq!(metadata.index("logs").unwrap().copies_per_shard(), 2);

        let mut builder = Metadata::builder(&metadata);
        builder.update_number_of_replicas("logs", 2).unwrap();
        let updated = builder.build();
        assert_eq!(updated.index("logs").unwrap().replica_count, 2);
        assert_eq!(updated.index("logs").unwrap().shard_count, 3);
        assert_eq!(metadata.index("logs").unwrap().replica_count, 1);
    }

    #[test]
    fn test_errors() {
        let mut builder = Metadata::builder(&Metadata::empty());
        assert!(matches!(
            builder.update_number_of_replicas("logs", 2),
            Err(Error::IndexNotFound(_))
        ));
        assert!(matches!(
            builder.create_index("logs", ReplicationConfig::new(0, 0)),
            Err(Error::InvalidShardCount { .. })
        ));
        builder
            .create_index("logs", ReplicationConfig::new(1, 0))
            .unwrap();
        assert!(matches!(
            builder.create_index("logs", ReplicationConfig::new(1, 0)),
            Err(Error::IndexAlreadyExists(_))
        ));
    }

    #[test]
    fn test_unchanged_returns_original() {
        let mut builder = Metadata::builder(&Metadata::empty());
        builder
            .create_index("logs", ReplicationConfig::new(1, 1))
            .unwrap();
        let metadata = builder.build();

        let mut builder = Metadata::builder(&metadata);
        builder
            .update_number_of_replicas("logs", 1)
            .unwrap()
            .remove_index("missing");
        assert!(Arc::ptr_eq(&builder.build(), &metadata));
    }
}
