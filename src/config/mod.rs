// src/config/mod.rs

//! Scenario loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed scenario model (`model.rs`).
//! - Load a scenario file from disk (`loader.rs`).
//! - Validate references, windows and the node graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    AccessConfig, BufferConfig, CopyConfig, DeviceConfig, NodeConfig, RuntimeSection,
    ScenarioFile,
};
pub use validate::{declared_devices, validate_config};
