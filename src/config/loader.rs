// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::ScenarioFile;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a scenario file and return the raw `ScenarioFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ScenarioFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: ScenarioFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        devices = config.device.len(),
        buffers = config.buffer.len(),
        nodes = config.node.len(),
        "loaded scenario"
    );
    Ok(config)
}

/// Load a scenario from path and validate it.
///
/// This is the entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks node shapes, device/buffer references, windows, `after`
///   references and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ScenarioFile> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}
