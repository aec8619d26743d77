// src/exec/backend.rs

//! Pluggable backend abstraction.
//!
//! The scheduler never talks to a device driver. It asks a
//! [`BackendRegistry`] for the [`Allocator`] and [`Executor`] of a device and
//! hands ready operations to [`Executor::submit_directly`].
//!
//! - Production code registers real backends.
//! - The scenario runner registers the simulated backend from
//!   [`crate::exec::sim`].
//! - Tests register fakes that record what was dispatched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::dag::{NodeId, Operation};
use crate::errors::{Result, RuntimeError};
use crate::exec::event::CompletionHandle;
use crate::types::{BackendId, DeviceId, DevicePtr};

/// Device memory allocator.
pub trait Allocator: Send + Sync {
    /// Allocate `bytes` bytes at `alignment`. `None` means out of memory.
    fn allocate(&self, alignment: usize, bytes: usize) -> Option<DevicePtr>;
}

/// A predecessor the executor must wait for before starting an operation.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub node: NodeId,
    pub event: CompletionHandle,
}

/// Everything an executor gets for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    /// Node the operation belongs to. For transfers generated from a
    /// requirement this is the requirement node.
    pub node: NodeId,
    pub device: DeviceId,
    pub operation: &'a Operation,
    /// Complete and sufficient set of predecessors, sorted and deduplicated.
    pub dependencies: &'a [Dependency],
}

/// Accepts ready operations and runs them asynchronously.
pub trait Executor: Send + Sync {
    /// Enqueue the operation. Must not block beyond enqueue time.
    fn submit_directly(&self, request: DispatchRequest<'_>) -> CompletionHandle;
}

pub trait Backend: Send + Sync {
    fn id(&self) -> BackendId;

    fn name(&self) -> &str;

    fn allocator(&self, device: DeviceId) -> Option<Arc<dyn Allocator>>;

    fn executor(&self, device: DeviceId) -> Option<Arc<dyn Executor>>;
}

/// Explicit registry of backends, injected into the scheduler.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendId, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one with the same id.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let id = backend.id();
        debug!(backend = %id, name = backend.name(), "registered backend");
        self.backends.insert(id, backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn backend(&self, id: BackendId) -> Result<&Arc<dyn Backend>> {
        self.backends
            .get(&id)
            .ok_or_else(|| RuntimeError::BackendUnavailable(format!("no backend registered for '{id}'")))
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.values()
    }

    pub fn allocator(&self, device: DeviceId) -> Result<Arc<dyn Allocator>> {
        self.backend(device.backend)?
            .allocator(device)
            .ok_or_else(|| RuntimeError::BackendUnavailable(format!("no allocator for device {device}")))
    }

    pub fn executor(&self, backend: BackendId, device: DeviceId) -> Result<Arc<dyn Executor>> {
        self.backend(backend)?.executor(device).ok_or_else(|| {
            RuntimeError::BackendUnavailable(format!(
                "backend '{backend}' has no executor for device {device}"
            ))
        })
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.values().map(|b| b.name()))
            .finish()
    }
}
