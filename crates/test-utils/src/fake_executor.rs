use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dagrt::dag::{NodeId, Operation};
use dagrt::exec::{
    Allocator, Backend, BackendRegistry, CompletionHandle, CompletionSignal, DispatchRequest,
    Executor,
};
use dagrt::types::{BackendId, DeviceId, DevicePtr};
use tracing::debug;

/// One operation handed to a fake executor.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub node: NodeId,
    pub backend: BackendId,
    pub device: DeviceId,
    pub operation: Operation,
    pub dependencies: Vec<NodeId>,
}

impl Dispatch {
    pub fn is_transfer(&self) -> bool {
        self.operation.is_data_transfer()
    }
}

/// Shared record of every dispatch, with the signals that complete them.
#[derive(Debug, Default)]
pub struct DispatchLog {
    entries: Mutex<Vec<(Dispatch, CompletionSignal)>>,
}

impl DispatchLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transfers(&self) -> Vec<Dispatch> {
        self.dispatches().into_iter().filter(Dispatch::is_transfer).collect()
    }

    /// Dispatches that belong to `node`.
    pub fn for_node(&self, node: NodeId) -> Vec<Dispatch> {
        self.dispatches()
            .into_iter()
            .filter(|d| d.node == node)
            .collect()
    }

    /// Fire the completion of every operation of `node`.
    pub fn complete(&self, node: NodeId) {
        for (dispatch, signal) in self.entries.lock().unwrap().iter() {
            if dispatch.node == node {
                signal.complete();
            }
        }
    }

    pub fn complete_all(&self) {
        for (_, signal) in self.entries.lock().unwrap().iter() {
            signal.complete();
        }
    }

    fn push(&self, dispatch: Dispatch, signal: CompletionSignal) {
        self.entries.lock().unwrap().push((dispatch, signal));
    }
}

/// Executor that records dispatches instead of running them.
///
/// With `auto_complete` every operation completes as soon as it is
/// dispatched; otherwise tests complete them through the [`DispatchLog`].
pub struct FakeExecutor {
    backend: BackendId,
    log: Arc<DispatchLog>,
    auto_complete: bool,
}

impl FakeExecutor {
    pub fn new(backend: BackendId, log: Arc<DispatchLog>, auto_complete: bool) -> Self {
        Self {
            backend,
            log,
            auto_complete,
        }
    }
}

impl Executor for FakeExecutor {
    fn submit_directly(&self, request: DispatchRequest<'_>) -> CompletionHandle {
        let (signal, handle) = CompletionHandle::pair();
        debug!(
            node = %request.node,
            backend = %self.backend,
            kind = request.operation.kind(),
            deps = request.dependencies.len(),
            "fake dispatch"
        );
        self.log.push(
            Dispatch {
                node: request.node,
                backend: self.backend,
                device: request.device,
                operation: request.operation.clone(),
                dependencies: request.dependencies.iter().map(|d| d.node).collect(),
            },
            signal.clone(),
        );
        if self.auto_complete {
            signal.complete();
        }
        handle
    }
}

/// Bump allocator with an optional capacity, counting calls.
#[derive(Debug, Default)]
pub struct FakeAllocator {
    used: Mutex<u64>,
    capacity: Option<u64>,
    calls: AtomicUsize,
}

impl FakeAllocator {
    pub fn new(capacity: Option<u64>) -> Self {
        Self {
            used: Mutex::new(0),
            capacity,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Allocator for FakeAllocator {
    fn allocate(&self, alignment: usize, bytes: usize) -> Option<DevicePtr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let alignment = alignment.max(1) as u64;
        let mut used = self.used.lock().unwrap();
        let start = (*used).div_ceil(alignment) * alignment;
        let end = start + bytes as u64;
        if self.capacity.is_some_and(|cap| end > cap) {
            return None;
        }
        *used = end;
        Some(DevicePtr(0x1000_0000 + start))
    }
}

/// Backend serving every device index of one backend kind.
pub struct FakeBackend {
    id: BackendId,
    name: String,
    executor: Arc<FakeExecutor>,
    allocator: Arc<FakeAllocator>,
}

impl FakeBackend {
    pub fn new(id: BackendId, log: Arc<DispatchLog>, auto_complete: bool) -> Self {
        Self {
            id,
            name: format!("fake-{id}"),
            executor: Arc::new(FakeExecutor::new(id, log, auto_complete)),
            allocator: Arc::new(FakeAllocator::new(None)),
        }
    }

    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.allocator = Arc::new(FakeAllocator::new(Some(bytes)));
        self
    }

    pub fn allocator_handle(&self) -> Arc<FakeAllocator> {
        Arc::clone(&self.allocator)
    }
}

impl Backend for FakeBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn allocator(&self, device: DeviceId) -> Option<Arc<dyn Allocator>> {
        (device.backend == self.id).then(|| Arc::clone(&self.allocator) as Arc<dyn Allocator>)
    }

    fn executor(&self, _device: DeviceId) -> Option<Arc<dyn Executor>> {
        Some(Arc::clone(&self.executor) as Arc<dyn Executor>)
    }
}

/// Registry with a fake backend for each of `backends`, all recording into
/// one log.
pub fn fake_registry(backends: &[BackendId], auto_complete: bool) -> (BackendRegistry, Arc<DispatchLog>) {
    let log = DispatchLog::new();
    let mut registry = BackendRegistry::new();
    for &id in backends {
        registry.register(Arc::new(FakeBackend::new(id, Arc::clone(&log), auto_complete)));
    }
    (registry, log)
}
