// src/exec/sim.rs

//! Simulated backend used by the scenario runner.
//!
//! Each simulated device has a bump allocator with a fixed capacity and an
//! executor that runs every operation as a tokio task: wait for the
//! dependencies, sleep for the device latency, fire the completion signal.
//! Every dispatch is appended to a shared [`DispatchJournal`] so the run can
//! be reported afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::dag::{NodeId, Operation};
use crate::exec::backend::{Allocator, Backend, DispatchRequest, Executor};
use crate::exec::event::CompletionHandle;
use crate::types::{BackendId, DeviceId, DevicePtr};

/// One dispatched operation as seen by a simulated executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub node: NodeId,
    pub backend: BackendId,
    pub device: DeviceId,
    /// `kernel` or `memcpy`.
    pub kind: &'static str,
    /// Kernel name, or `source -> dest` for transfers.
    pub label: String,
    pub dependencies: Vec<NodeId>,
}

/// Append-only log of dispatches, shared by all simulated executors.
#[derive(Debug, Default)]
pub struct DispatchJournal {
    records: Mutex<Vec<DispatchRecord>>,
}

impl DispatchJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: DispatchRecord) {
        self.lock().push(record);
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of transfers dispatched so far.
    pub fn transfer_count(&self) -> usize {
        self.lock().iter().filter(|r| r.kind == "memcpy").count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DispatchRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Capacity and latency of one simulated device.
#[derive(Debug, Clone, Copy)]
pub struct SimDeviceSpec {
    pub device: DeviceId,
    pub memory: usize,
    pub latency: Duration,
}

/// Bump allocator over a fake address range. Memory is never freed.
#[derive(Debug)]
pub struct SimAllocator {
    device: DeviceId,
    base: u64,
    capacity: u64,
    used: Mutex<u64>,
}

impl SimAllocator {
    pub fn new(device: DeviceId, capacity: usize) -> Self {
        // Distinct, recognizable address ranges per device.
        let base = ((device.backend as u64 + 1) << 40) | ((u64::from(device.index) + 1) << 32);
        Self {
            device,
            base,
            capacity: capacity as u64,
            used: Mutex::new(0),
        }
    }

    /// Bytes handed out so far, alignment padding included.
    pub fn used(&self) -> u64 {
        *self.used.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Allocator for SimAllocator {
    fn allocate(&self, alignment: usize, bytes: usize) -> Option<DevicePtr> {
        let alignment = alignment.max(1) as u64;
        let mut used = self.used.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let start = used.checked_add(alignment - 1)? / alignment * alignment;
        let end = start.checked_add(bytes as u64)?;
        if end > self.capacity {
            warn!(
                device = %self.device,
                requested = bytes,
                used = *used,
                capacity = self.capacity,
                "simulated device out of memory"
            );
            return None;
        }

        *used = end;
        Some(DevicePtr(self.base + start))
    }
}

/// Executor that completes every operation after the device latency.
#[derive(Debug)]
pub struct SimExecutor {
    backend: BackendId,
    device: DeviceId,
    latency: Duration,
    runtime: Handle,
    journal: Arc<DispatchJournal>,
}

impl SimExecutor {
    pub fn new(
        backend: BackendId,
        spec: SimDeviceSpec,
        runtime: Handle,
        journal: Arc<DispatchJournal>,
    ) -> Self {
        Self {
            backend,
            device: spec.device,
            latency: spec.latency,
            runtime,
            journal,
        }
    }
}

impl Executor for SimExecutor {
    fn submit_directly(&self, request: DispatchRequest<'_>) -> CompletionHandle {
        let label = match request.operation {
            Operation::Kernel(kernel) => kernel.name.clone(),
            Operation::MemCopy(copy) => format!("{} -> {}", copy.source.device, copy.dest.device),
            Operation::Requirement(req) => format!("requirement on {}", req.region),
        };

        self.journal.record(DispatchRecord {
            node: request.node,
            backend: self.backend,
            device: request.device,
            kind: request.operation.kind(),
            label: label.clone(),
            dependencies: request.dependencies.iter().map(|d| d.node).collect(),
        });

        let (signal, handle) = CompletionHandle::pair();
        let waits: Vec<CompletionHandle> =
            request.dependencies.iter().map(|d| d.event.clone()).collect();
        let latency = self.latency;
        let node = request.node;
        let executor_device = self.device;

        debug!(%node, device = %executor_device, op = %label, deps = waits.len(), "simulated dispatch");

        self.runtime.spawn(async move {
            for dep in waits.iter() {
                dep.wait().await;
            }
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            trace!(%node, device = %executor_device, "simulated operation complete");
            signal.complete();
        });

        handle
    }
}

/// A simulated backend owning a set of devices of one backend kind.
pub struct SimBackend {
    id: BackendId,
    name: String,
    runtime: Handle,
    journal: Arc<DispatchJournal>,
    devices: BTreeMap<DeviceId, (Arc<SimAllocator>, Arc<SimExecutor>)>,
}

impl SimBackend {
    pub fn new(id: BackendId, runtime: Handle, journal: Arc<DispatchJournal>) -> Self {
        Self {
            id,
            name: format!("sim-{id}"),
            runtime,
            journal,
            devices: BTreeMap::new(),
        }
    }

    /// Add a device. Devices of other backends are ignored.
    pub fn add_device(&mut self, spec: SimDeviceSpec) {
        if spec.device.backend != self.id {
            warn!(backend = %self.id, device = %spec.device, "device does not belong to backend; ignoring");
            return;
        }
        let allocator = Arc::new(SimAllocator::new(spec.device, spec.memory));
        let executor = Arc::new(SimExecutor::new(
            self.id,
            spec,
            self.runtime.clone(),
            Arc::clone(&self.journal),
        ));
        self.devices.insert(spec.device, (allocator, executor));
    }

    pub fn with_device(mut self, spec: SimDeviceSpec) -> Self {
        self.add_device(spec);
        self
    }

    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.keys().copied()
    }

    pub fn allocator_of(&self, device: DeviceId) -> Option<&Arc<SimAllocator>> {
        self.devices.get(&device).map(|(a, _)| a)
    }
}

impl Backend for SimBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn allocator(&self, device: DeviceId) -> Option<Arc<dyn Allocator>> {
        let (allocator, _) = self.devices.get(&device)?;
        Some(Arc::clone(allocator) as Arc<dyn Allocator>)
    }

    /// The device's own executor. Operations bound to a device of another
    /// backend (a transfer involving the host, say) run on this backend's
    /// first device.
    fn executor(&self, device: DeviceId) -> Option<Arc<dyn Executor>> {
        let (_, executor) = self
            .devices
            .get(&device)
            .or_else(|| self.devices.values().next())?;
        Some(Arc::clone(executor) as Arc<dyn Executor>)
    }
}
