//! Error types for shardroute

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Routing table errors ===
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid shard count for index {index}: {count}")]
    InvalidShardCount { index: String, count: u32 },

    #[error("Shard copy not found: {0}")]
    CopyNotFound(String),

    // === Membership errors ===
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // === Allocation errors ===
    #[error("Cannot move {copy} to {target}: {reason}")]
    InvalidMove {
        copy: String,
        target: String,
        reason: String,
    },

    #[error("Cannot move {copy} to {target}: target is at its recovery limit")]
    MoveThrottled { copy: String, target: String },

    // === Config errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// A throttled move may succeed once the target finishes its current
    /// recoveries; everything else needs the caller to change its input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::MoveThrottled { .. })
    }
}
