// src/types.rs

//! Small value types shared by the scheduler, the memory tracker and the
//! backends.

use std::fmt;
use std::str::FromStr;

/// Identifier of a backend family.
///
/// Each backend owns allocators and executors for its devices; the registry
/// in [`crate::exec::backend`] maps a `BackendId` to a concrete backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendId {
    /// Host CPU memory and execution.
    Host,
    Cuda,
    Hip,
    LevelZero,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Host => "host",
            BackendId::Cuda => "cuda",
            BackendId::Hip => "hip",
            BackendId::LevelZero => "level_zero",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "host" | "omp" | "cpu" => Ok(BackendId::Host),
            "cuda" => Ok(BackendId::Cuda),
            "hip" => Ok(BackendId::Hip),
            "level_zero" | "ze" => Ok(BackendId::LevelZero),
            other => Err(format!(
                "invalid backend: {other} (expected \"host\", \"cuda\", \"hip\" or \"level_zero\")"
            )),
        }
    }
}

/// A device: backend plus device index within that backend.
///
/// Printed and parsed as `backend:index`, e.g. `cuda:1` or `host:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    pub backend: BackendId,
    pub index: u32,
}

impl DeviceId {
    pub const fn new(backend: BackendId, index: u32) -> Self {
        Self { backend, index }
    }

    /// The host device every scenario implicitly has.
    pub const fn host() -> Self {
        Self::new(BackendId::Host, 0)
    }

    pub fn is_host(&self) -> bool {
        self.backend == BackendId::Host
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.index)
    }
}

impl FromStr for DeviceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, index) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid device id: {s} (expected \"backend:index\")"))?;
        let backend = BackendId::from_str(backend)?;
        let index = index
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid device index in {s}: {e}"))?;
        Ok(DeviceId { backend, index })
    }
}

/// How a requirement accesses its buffer window.
///
/// The `Discard*` modes promise that the whole window is overwritten, so the
/// previous contents never have to be materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
    DiscardWrite,
    DiscardReadWrite,
}

impl AccessMode {
    pub fn is_discard(&self) -> bool {
        matches!(self, AccessMode::DiscardWrite | AccessMode::DiscardReadWrite)
    }

    /// Anything except plain `Read` may modify the window.
    pub fn is_write(&self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::ReadWrite => "read_write",
            AccessMode::DiscardWrite => "discard_write",
            AccessMode::DiscardReadWrite => "discard_read_write",
        }
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::ReadWrite
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(AccessMode::Read),
            "write" => Ok(AccessMode::Write),
            "read_write" => Ok(AccessMode::ReadWrite),
            "discard_write" => Ok(AccessMode::DiscardWrite),
            "discard_read_write" => Ok(AccessMode::DiscardReadWrite),
            other => Err(format!(
                "invalid access mode: {other} (expected read, write, read_write, discard_write or discard_read_write)"
            )),
        }
    }
}

/// Opaque device address handed out by an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevicePtr(pub u64);

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
