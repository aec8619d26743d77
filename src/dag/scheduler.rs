// src/dag/scheduler.rs

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dag::cancel::abort_submission;
use crate::dag::graph::DagGraph;
use crate::dag::node::{ExecutorBinding, NodeId};
use crate::dag::operation::Operation;
use crate::dag::resolver::RequirementResolver;
use crate::engine::diagnostics::ErrorObserver;
use crate::engine::submitted::SubmittedOps;
use crate::errors::{Result, RuntimeError};
use crate::exec::backend::{BackendRegistry, Dependency, DispatchRequest, Executor};
use crate::memory::Rect;
use crate::types::DeviceId;

/// Alignment requested for lazily created device allocations.
pub const DEFAULT_ALLOCATION_ALIGNMENT: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub allocation_alignment: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            allocation_alignment: DEFAULT_ALLOCATION_ALIGNMENT,
        }
    }
}

/// Greedy, immediate scheduler.
///
/// Each call to [`DirectScheduler::submit`] runs to completion on the
/// caller's thread: it binds devices, resolves the node's implicit
/// requirements into transfers, and dispatches the node to an executor, or
/// it cancels everything it had not dispatched yet and returns the error.
/// There is no look-ahead and no reordering.
///
/// The scheduler is responsible for:
/// - binding nodes and their requirements to devices
/// - materializing buffer requirements through the resolver
/// - choosing an executor for every explicit operation
/// - handing each operation a minimal, complete dependency list
/// - aborting the whole submission on the first failure
pub struct DirectScheduler {
    registry: Arc<BackendRegistry>,
    submitted: Arc<SubmittedOps>,
    observer: Option<Arc<dyn ErrorObserver>>,
    options: SchedulerOptions,
}

impl DirectScheduler {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            submitted: Arc::new(SubmittedOps::new()),
            observer: None,
            options: SchedulerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn submitted_ops(&self) -> &Arc<SubmittedOps> {
        &self.submitted
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Submit a node and everything it implicitly requires.
    ///
    /// Nodes that were already submitted, completed or cancelled are left
    /// alone. On failure the node and every unsubmitted requirement reachable
    /// from it are cancelled and the validity tracker is rolled back to its
    /// state before the call; work dispatched before the failure keeps
    /// running.
    pub fn submit(&self, graph: &mut DagGraph, node: NodeId) -> Result<()> {
        let current = graph.try_node(node)?;
        if current.is_submitted() {
            debug!(%node, "node already submitted; nothing to do");
            return Ok(());
        }
        if current.is_cancelled() {
            warn!(%node, "node was cancelled earlier; refusing to resubmit");
            return Ok(());
        }

        // Nothing dispatched by a failed submission writes, so none of the
        // marks it made may outlive it.
        let validity = graph.validity_snapshot();
        match self.submit_inner(graph, node) {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(%node, error = %err, "submission failed; aborting");
                graph.restore_validity(validity);
                let cancelled = abort_submission(graph, node);
                debug!(%node, cancelled = ?cancelled, "aborted submission");
                if let Some(observer) = &self.observer {
                    observer.on_error(node, &err);
                }
                Err(err)
            }
        }
    }

    fn submit_inner(&self, graph: &mut DagGraph, node: NodeId) -> Result<()> {
        let Some(device) = graph.try_node(node)?.hints().bound_device() else {
            return Err(RuntimeError::FeatureNotSupported(
                "direct scheduler does not support DAG nodes not bound to devices".to_string(),
            ));
        };
        graph.node_mut(node)?.assign_to_device(device);

        let resolver = RequirementResolver::new(&self.registry, &self.options);

        if graph.try_node(node)?.operation().is_requirement() {
            // Binds and resolves the node's own requirements first.
            resolver.resolve(graph, node)?;
        } else {
            resolver.prepare_requirements(graph, node, device)?;

            let (executor, binding) =
                select_executor(&self.registry, device, graph.try_node(node)?.operation())?;
            dispatch(graph, node, executor.as_ref(), binding)?;
            keep_copy_source_valid(graph, node)?;
        }

        let submitted = graph.try_node(node)?;
        info!(
            %node,
            %device,
            kind = submitted.operation().kind(),
            state = ?submitted.state(),
            "node submitted"
        );
        self.submitted
            .register_submitted_ops(node, submitted.event().cloned());
        Ok(())
    }
}

impl std::fmt::Debug for DirectScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectScheduler")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

/// Pick the executor for an explicit operation: its preferred backend if it
/// has one, otherwise the backend of the device it is bound to.
pub(crate) fn select_executor(
    registry: &BackendRegistry,
    device: DeviceId,
    operation: &Operation,
) -> Result<(Arc<dyn Executor>, ExecutorBinding)> {
    if operation.is_requirement() {
        return Err(RuntimeError::FeatureNotSupported(
            "requirements cannot be dispatched to an executor".to_string(),
        ));
    }

    let backend = operation.preferred_backend().unwrap_or(device.backend);
    let executor = registry.executor(backend, device)?;
    Ok((executor, ExecutorBinding { backend, device }))
}

/// Predecessors an operation of `node` has to wait for.
///
/// Walks the node's requirements, looking through virtually submitted nodes
/// to their own requirements, drops complete nodes, and returns the rest
/// sorted by id without duplicates.
pub(crate) fn collect_dependencies(graph: &DagGraph, node: NodeId) -> Vec<Dependency> {
    let mut stack: Vec<NodeId> = graph.requirements_of(node).to_vec();
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut deps = Vec::new();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        // Pruned nodes were finished.
        let Some(req) = graph.node(id) else {
            continue;
        };

        if req.is_virtual() {
            stack.extend(req.requirements().iter().copied());
            continue;
        }
        if req.is_complete() {
            continue;
        }
        match req.event() {
            Some(event) => deps.push(Dependency {
                node: id,
                event: event.clone(),
            }),
            None => warn!(%node, requirement = %id, "requirement has no completion event; skipping"),
        }
    }

    deps.sort_by_key(|d| d.node);
    deps.dedup_by_key(|d| d.node);
    deps
}

/// Hand an explicit node to its executor and mark it submitted.
fn dispatch(
    graph: &mut DagGraph,
    node: NodeId,
    executor: &dyn Executor,
    binding: ExecutorBinding,
) -> Result<()> {
    let dependencies = collect_dependencies(graph, node);

    let handle = {
        let target = graph.try_node(node)?;
        debug!(
            %node,
            backend = %binding.backend,
            device = %binding.device,
            dependencies = ?dependencies.iter().map(|d| d.node).collect::<Vec<_>>(),
            "dispatching node"
        );
        executor.submit_directly(DispatchRequest {
            node,
            device: binding.device,
            operation: target.operation(),
            dependencies: &dependencies,
        })
    };

    let target = graph.node_mut(node)?;
    target.assign_to_executor(binding);
    target.mark_submitted(handle);
    Ok(())
}

/// A copy only reads its source. When one of the copy's own requirements
/// made the source window valid, it stays valid after the destination
/// write has invalidated it.
fn keep_copy_source_valid(graph: &mut DagGraph, node: NodeId) -> Result<()> {
    let Operation::MemCopy(copy) = *graph.try_node(node)?.operation() else {
        return Ok(());
    };
    let source = copy.source;
    let window = Rect::new(source.offset, copy.extent);

    let guarded = graph.requirements_of(node).iter().any(|&id| {
        graph.node(id).is_some_and(|req| {
            req.assigned_device() == Some(source.device)
                && req.operation().as_requirement().is_some_and(|bmem| {
                    bmem.region == source.region
                        && !bmem.mode.is_discard()
                        && Rect::new(bmem.offset, bmem.extent).contains(&window)
                })
        })
    });
    if !guarded {
        return Ok(());
    }

    graph
        .region_mut(source.region)
        .ok_or(RuntimeError::RegionNotFound(source.region))?
        .mark_range_valid(source.device, source.offset, copy.extent);
    Ok(())
}
