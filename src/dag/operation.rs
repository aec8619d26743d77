// src/dag/operation.rs

//! The work a DAG node performs.

use crate::memory::{DataRegionId, Id3, Range3, Rect};
use crate::types::{AccessMode, BackendId, DeviceId, DevicePtr};

/// Sum type over everything a node can carry.
///
/// `Kernel` and `MemCopy` are explicit operations that go straight to an
/// executor. `Requirement` only declares a need ("this window must be usable
/// here") and is turned into zero or more transfers by the resolver.
#[derive(Debug, Clone)]
pub enum Operation {
    Kernel(KernelOperation),
    MemCopy(MemcpyOperation),
    Requirement(BufferMemoryRequirement),
}

impl Operation {
    pub fn is_requirement(&self) -> bool {
        matches!(self, Operation::Requirement(_))
    }

    pub fn is_data_transfer(&self) -> bool {
        matches!(self, Operation::MemCopy(_))
    }

    /// Backend that should execute this operation regardless of the device
    /// the node is bound to.
    pub fn preferred_backend(&self) -> Option<BackendId> {
        match self {
            Operation::Kernel(k) => k.preferred_backend,
            Operation::MemCopy(m) => m.preferred_backend(),
            Operation::Requirement(_) => None,
        }
    }

    pub fn as_requirement(&self) -> Option<&BufferMemoryRequirement> {
        match self {
            Operation::Requirement(req) => Some(req),
            _ => None,
        }
    }

    /// Short label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Kernel(_) => "kernel",
            Operation::MemCopy(_) => "memcpy",
            Operation::Requirement(_) => "requirement",
        }
    }
}

/// A kernel launch. The kernel body itself lives with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOperation {
    pub name: String,
    pub preferred_backend: Option<BackendId>,
}

impl KernelOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preferred_backend: None,
        }
    }

    pub fn with_preferred_backend(mut self, backend: BackendId) -> Self {
        self.preferred_backend = Some(backend);
        self
    }
}

/// One end of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLocation {
    pub device: DeviceId,
    pub offset: Id3,
    pub region: DataRegionId,
}

/// Copy `extent` elements from `source` to `dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemcpyOperation {
    pub source: MemoryLocation,
    pub dest: MemoryLocation,
    pub extent: Range3,
}

impl MemcpyOperation {
    /// A copy touching the host is executed by the other side's backend;
    /// copies between two devices have no preference.
    pub fn preferred_backend(&self) -> Option<BackendId> {
        match (self.source.device.is_host(), self.dest.device.is_host()) {
            (true, false) => Some(self.dest.device.backend),
            (false, true) => Some(self.source.device.backend),
            _ => None,
        }
    }

    pub fn dest_rect(&self) -> Rect {
        Rect::new(self.dest.offset, self.extent)
    }

    pub fn source_rect(&self) -> Rect {
        Rect::new(self.source.offset, self.extent)
    }
}

/// "This window of this buffer must be accessible on the node's device."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferMemoryRequirement {
    pub region: DataRegionId,
    pub offset: Id3,
    pub extent: Range3,
    pub mode: AccessMode,
    /// Device pointer bound during resolution so dependent kernels can
    /// address the allocation.
    pub device_data: Option<DevicePtr>,
}

impl BufferMemoryRequirement {
    pub fn new(region: DataRegionId, offset: Id3, extent: Range3, mode: AccessMode) -> Self {
        Self {
            region,
            offset,
            extent,
            mode,
            device_data: None,
        }
    }

    pub fn window(&self) -> Rect {
        Rect::new(self.offset, self.extent)
    }
}
