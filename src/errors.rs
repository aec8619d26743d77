// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::dag::NodeId;
use crate::memory::DataRegionId;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An allocator returned no memory.
    #[error("Memory allocation error: {0}")]
    MemoryAllocation(String),

    /// A stale range has no device holding valid data to copy from.
    #[error("No update source: {0}")]
    NoUpdateSource(String),

    #[error("Feature not supported: {0}")]
    FeatureNotSupported(String),

    /// The registry has no backend, allocator or executor for a request.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Data region not found: {0}")]
    RegionNotFound(DataRegionId),

    #[error("Invalid access: {0}")]
    InvalidAccess(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
