// tests/sim_backend.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use dagrt::dag::{DagGraph, DirectScheduler, ExecutionHints, KernelOperation, NodeStatus};
use dagrt::exec::{
    Allocator, Backend, BackendRegistry, CompletionHandle, DispatchJournal, SimBackend,
    SimDeviceSpec,
};
use dagrt::types::BackendId;
use dagrt_test_utils::builders::{cuda, hip, host};
use dagrt_test_utils::{TestResult, init_tracing, wait_for_node, with_timeout};

fn cuda_backend(journal: &Arc<DispatchJournal>, memory: usize, latency_ms: u64) -> SimBackend {
    SimBackend::new(BackendId::Cuda, Handle::current(), Arc::clone(journal)).with_device(
        SimDeviceSpec {
            device: cuda(0),
            memory,
            latency: Duration::from_millis(latency_ms),
        },
    )
}

#[tokio::test]
async fn allocator_bumps_aligned_and_refuses_past_capacity() -> TestResult {
    init_tracing();
    let journal = Arc::new(DispatchJournal::new());
    let backend = cuda_backend(&journal, 512, 0);
    let allocator = backend.allocator(cuda(0)).expect("cuda:0 allocator");

    let first = allocator.allocate(128, 100).expect("first allocation");
    let second = allocator.allocate(128, 100).expect("second allocation");
    assert_eq!(second.0 - first.0, 128);
    assert_eq!(backend.allocator_of(cuda(0)).map(|a| a.used()), Some(228));

    assert!(allocator.allocate(128, 512).is_none());
    assert_eq!(backend.allocator_of(cuda(0)).map(|a| a.used()), Some(228));
    Ok(())
}

#[tokio::test]
async fn backend_serves_only_its_own_devices() -> TestResult {
    init_tracing();
    let journal = Arc::new(DispatchJournal::new());
    let mut backend = cuda_backend(&journal, 1024, 0);
    backend.add_device(SimDeviceSpec {
        device: hip(0),
        memory: 1024,
        latency: Duration::ZERO,
    });

    assert_eq!(backend.devices().collect::<Vec<_>>(), vec![cuda(0)]);
    assert!(backend.allocator(host()).is_none());
    // Transfers bound to the host still find an executor.
    assert!(backend.executor(host()).is_some());
    assert_eq!(backend.name(), "sim-cuda");
    Ok(())
}

#[tokio::test]
async fn dependent_kernel_completes_after_its_predecessor() -> TestResult {
    init_tracing();
    let journal = Arc::new(DispatchJournal::new());
    let registry = BackendRegistry::new().with_backend(Arc::new(cuda_backend(&journal, 1 << 20, 5)));
    let scheduler = DirectScheduler::new(Arc::new(registry));

    let mut graph = DagGraph::new();
    let on_cuda = ExecutionHints::bind_to_device(cuda(0));
    let a = graph.add_kernel(KernelOperation::new("a"), vec![], on_cuda)?;
    let b = graph.add_kernel(KernelOperation::new("b"), vec![a], on_cuda)?;

    scheduler.submit(&mut graph, a)?;
    scheduler.submit(&mut graph, b)?;
    assert_eq!(graph.status_of(b), Some(NodeStatus::Submitted));

    wait_for_node(&graph, b).await;
    assert_eq!(graph.status_of(a), Some(NodeStatus::Complete));
    assert_eq!(graph.status_of(b), Some(NodeStatus::Complete));

    let records = journal.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].label, "a");
    assert_eq!(records[1].label, "b");
    assert_eq!(records[1].dependencies, vec![a]);
    assert_eq!(records[1].kind, "kernel");
    assert_eq!(journal.transfer_count(), 0);
    Ok(())
}

#[tokio::test]
async fn joined_handle_waits_for_every_member() -> TestResult {
    init_tracing();
    let (signal, pending) = CompletionHandle::pair();
    let joined = CompletionHandle::join(vec![CompletionHandle::completed(), pending]);

    assert_eq!(joined.operation_count(), 2);
    assert!(!joined.is_complete());

    let waiter = {
        let joined = joined.clone();
        tokio::spawn(async move { joined.wait().await })
    };
    signal.complete();
    with_timeout(waiter).await?;

    assert!(joined.is_complete());
    assert!(signal.is_complete());
    Ok(())
}
