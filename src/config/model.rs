// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::scheduler::DEFAULT_ALLOCATION_ALIGNMENT;
use crate::memory::{Id3, Range3};

/// Top-level scenario as read from a TOML file.
///
/// ```toml
/// [runtime]
/// allocation_alignment = 128
///
/// [device."cuda:0"]
/// memory = 1048576
/// latency_ms = 2
///
/// [buffer.A]
/// element_size = 4
/// range = [256]
/// initial_device = "host:0"
///
/// [node.scale]
/// kernel = "scale"
/// device = "cuda:0"
/// access = [{ buffer = "A", mode = "read_write" }]
///
/// [node.download]
/// copy = { buffer = "A", from = "cuda:0", to = "host:0" }
/// device = "host:0"
/// after = ["scale"]
/// ```
///
/// All sections are optional; validation requires at least one node.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScenarioFile {
    #[serde(default)]
    pub runtime: RuntimeSection,

    /// Simulated devices keyed by device id (`"backend:index"`). `host:0`
    /// always exists, even when not listed.
    #[serde(default)]
    pub device: BTreeMap<String, DeviceConfig>,

    /// Logical buffers keyed by name.
    #[serde(default)]
    pub buffer: BTreeMap<String, BufferConfig>,

    /// Explicit operations keyed by name.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// `[runtime]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Alignment for lazily created device allocations.
    #[serde(default = "default_allocation_alignment")]
    pub allocation_alignment: usize,
}

fn default_allocation_alignment() -> usize {
    DEFAULT_ALLOCATION_ALIGNMENT
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            allocation_alignment: default_allocation_alignment(),
        }
    }
}

/// `[device."<id>"]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Simulated memory capacity in bytes.
    #[serde(default = "default_device_memory")]
    pub memory: usize,

    /// Simulated time every dispatched operation takes.
    #[serde(default)]
    pub latency_ms: u64,
}

pub fn default_device_memory() -> usize {
    1 << 30
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            memory: default_device_memory(),
            latency_ms: 0,
        }
    }
}

/// `[buffer.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Bytes per element.
    pub element_size: usize,

    /// Element counts, one to three dimensions. Missing trailing dimensions
    /// are 1.
    pub range: Vec<usize>,

    /// Device holding the initial contents. Without it the buffer starts with
    /// no valid data anywhere.
    #[serde(default)]
    pub initial_device: Option<String>,
}

/// `[node.<name>]` section. Exactly one of `kernel` or `copy` must be set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeConfig {
    /// Kernel name for a kernel launch.
    #[serde(default)]
    pub kernel: Option<String>,

    /// Explicit transfer.
    #[serde(default)]
    pub copy: Option<CopyConfig>,

    /// Device the node is bound to. Nodes without one are rejected by the
    /// direct scheduler.
    #[serde(default)]
    pub device: Option<String>,

    /// Backend that should execute the kernel regardless of `device`.
    #[serde(default)]
    pub preferred_backend: Option<String>,

    /// Explicit dependencies on other nodes.
    #[serde(default)]
    pub after: Vec<String>,

    /// Buffer accesses of a kernel.
    #[serde(default)]
    pub access: Vec<AccessConfig>,
}

/// One buffer access of a kernel.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    pub buffer: String,

    /// `read`, `write`, `read_write`, `discard_write` or `discard_read_write`.
    #[serde(default = "default_access_mode")]
    pub mode: String,

    /// Defaults to the origin.
    #[serde(default)]
    pub offset: Option<Vec<usize>>,

    /// Defaults to the rest of the buffer from `offset`.
    #[serde(default)]
    pub extent: Option<Vec<usize>>,
}

fn default_access_mode() -> String {
    "read_write".to_string()
}

/// `copy = { ... }` of a transfer node.
#[derive(Debug, Clone, Deserialize)]
pub struct CopyConfig {
    pub buffer: String,
    pub from: String,
    pub to: String,

    #[serde(default)]
    pub offset: Option<Vec<usize>>,

    #[serde(default)]
    pub extent: Option<Vec<usize>>,
}

impl BufferConfig {
    /// Element counts padded to three dimensions. `None` when `range` has no
    /// entries or more than three.
    pub fn num_elements(&self) -> Option<Range3> {
        pad(&self.range, 1)
    }
}

impl AccessConfig {
    pub fn window(&self, range: Range3) -> Option<(Id3, Range3)> {
        access_window(range, self.offset.as_deref(), self.extent.as_deref())
    }
}

impl CopyConfig {
    pub fn window(&self, range: Range3) -> Option<(Id3, Range3)> {
        access_window(range, self.offset.as_deref(), self.extent.as_deref())
    }
}

fn pad(values: &[usize], fill: usize) -> Option<[usize; 3]> {
    if values.is_empty() || values.len() > 3 {
        return None;
    }
    let mut out = [fill; 3];
    out[..values.len()].copy_from_slice(values);
    Some(out)
}

/// Resolve an optional offset/extent pair against a buffer of `range`
/// elements. A missing extent covers the rest of the buffer from `offset`.
///
/// Only the shape is checked here; whether the window fits is up to the
/// caller.
pub fn access_window(
    range: Range3,
    offset: Option<&[usize]>,
    extent: Option<&[usize]>,
) -> Option<(Id3, Range3)> {
    let offset = match offset {
        Some(values) => pad(values, 0)?,
        None => [0; 3],
    };
    let extent = match extent {
        Some(values) => pad(values, 1)?,
        None => [
            range[0].checked_sub(offset[0])?,
            range[1].checked_sub(offset[1])?,
            range[2].checked_sub(offset[2])?,
        ],
    };
    Some((offset, extent))
}
