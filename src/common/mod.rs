//! Common utilities and types shared across shardroute

pub mod config;
pub mod error;
pub mod utils;

pub use config::{AllocationSettings, Config, EnableAllocation};
pub use error::{Error, Result};
pub use utils::NodeState;
