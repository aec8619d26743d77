// src/dag/resolver.rs

//! Materialization of implicit buffer requirements.
//!
//! Resolving a requirement makes its access window usable on the device the
//! requirement is bound to:
//!
//! 1. allocate the buffer on that device if needed,
//! 2. bind the device pointer into the requirement,
//! 3. unless the access discards prior content, copy every stale sub-range
//!    from a device that holds valid data,
//! 4. record the access in the validity tracker.
//!
//! A requirement that needed no transfer ends up virtually submitted.

use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::graph::DagGraph;
use crate::dag::node::{ExecutorBinding, NodeId};
use crate::dag::operation::{BufferMemoryRequirement, MemcpyOperation, MemoryLocation, Operation};
use crate::dag::scheduler::{SchedulerOptions, collect_dependencies, select_executor};
use crate::errors::{Result, RuntimeError};
use crate::exec::backend::{BackendRegistry, DispatchRequest, Executor};
use crate::exec::event::CompletionHandle;
use crate::memory::DataRegion;
use crate::types::{AccessMode, DeviceId};

/// What resolving a node amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The node is not a requirement; nothing to resolve.
    NotARequirement,
    /// Already submitted by an earlier call.
    AlreadySubmitted,
    /// Window already usable (or access discards it); no transfer issued.
    Virtual,
    /// This many transfers were dispatched.
    Transferred(usize),
}

pub struct RequirementResolver<'a> {
    registry: &'a BackendRegistry,
    options: &'a SchedulerOptions,
}

impl<'a> RequirementResolver<'a> {
    pub fn new(registry: &'a BackendRegistry, options: &'a SchedulerOptions) -> Self {
        Self { registry, options }
    }

    /// Bind the direct requirements of `node` to devices and bring them into
    /// a submitted state.
    ///
    /// Requirements without their own binding hint inherit `device`.
    /// Explicit operations among them must already be submitted: only one
    /// new explicit node is processed per submission.
    pub fn prepare_requirements(&self, graph: &mut DagGraph, node: NodeId, device: DeviceId) -> Result<()> {
        let requirements = graph.requirements_of(node).to_vec();

        for &req in &requirements {
            let req_node = graph.node_mut(req)?;
            let target = req_node.hints().bound_device().unwrap_or(device);
            req_node.assign_to_device(target);
        }

        for req in requirements {
            let req_node = graph.try_node(req)?;
            if req_node.operation().is_requirement() {
                self.resolve(graph, req)?;
            } else if req_node.is_cancelled() {
                return Err(RuntimeError::FeatureNotSupported(format!(
                    "{req} required by {node} was cancelled"
                )));
            } else if !req_node.is_submitted() {
                return Err(RuntimeError::FeatureNotSupported(format!(
                    "direct scheduler does not support processing multiple unsubmitted nodes \
                     ({req} required by {node} has not been submitted)"
                )));
            }
        }

        Ok(())
    }

    /// Resolve one buffer requirement node. Safe to call repeatedly: only the
    /// first call on an unsubmitted node has side effects.
    pub fn resolve(&self, graph: &mut DagGraph, req: NodeId) -> Result<Resolution> {
        let node = graph.try_node(req)?;
        let Operation::Requirement(bmem) = node.operation() else {
            return Ok(Resolution::NotARequirement);
        };
        if node.is_submitted() {
            return Ok(Resolution::AlreadySubmitted);
        }
        if node.is_cancelled() {
            return Err(RuntimeError::FeatureNotSupported(format!(
                "requirement {req} was cancelled and cannot be resubmitted"
            )));
        }
        let bmem = bmem.clone();
        let device = node
            .assigned_device()
            .or_else(|| node.hints().bound_device())
            .ok_or_else(|| {
                RuntimeError::FeatureNotSupported(format!(
                    "requirement {req} is not bound to a device"
                ))
            })?;
        graph.node_mut(req)?.assign_to_device(device);

        self.prepare_requirements(graph, req, device)?;

        self.ensure_allocation_exists(graph, &bmem, device)?;
        self.initialize_memory_access(graph, req, &bmem, device)?;

        let mut planned: Vec<(Operation, Arc<dyn Executor>, ExecutorBinding)> = Vec::new();
        if !bmem.mode.is_discard() {
            let region = region_of(graph, &bmem)?;
            for copy in plan_transfers(region, device, &bmem)? {
                let operation = Operation::MemCopy(copy);
                let (executor, binding) = select_executor(self.registry, device, &operation)?;
                planned.push((operation, executor, binding));
            }
        }

        let resolution = if planned.is_empty() {
            graph.node_mut(req)?.mark_virtually_submitted();
            debug!(node = %req, mode = %bmem.mode, %device, "requirement satisfied without transfers; virtually submitted");
            Resolution::Virtual
        } else {
            let dependencies = collect_dependencies(graph, req);
            let count = planned.len();
            let mut handles = Vec::with_capacity(count);
            let first_binding = planned[0].2;

            for (operation, executor, binding) in &planned {
                if let Operation::MemCopy(copy) = operation {
                    info!(
                        node = %req,
                        from = %copy.source.device,
                        to = %copy.dest.device,
                        offset = ?copy.dest.offset,
                        extent = ?copy.extent,
                        backend = %binding.backend,
                        "dispatching transfer for requirement"
                    );
                }
                handles.push(executor.submit_directly(DispatchRequest {
                    node: req,
                    device,
                    operation,
                    dependencies: &dependencies,
                }));
            }

            let node = graph.node_mut(req)?;
            node.assign_to_executor(first_binding);
            node.mark_submitted(CompletionHandle::join(handles));
            Resolution::Transferred(count)
        };

        let region = graph
            .region_mut(bmem.region)
            .ok_or(RuntimeError::RegionNotFound(bmem.region))?;
        match bmem.mode {
            AccessMode::Read => region.mark_range_valid(device, bmem.offset, bmem.extent),
            _ => region.mark_range_current(device, bmem.offset, bmem.extent),
        }

        Ok(resolution)
    }

    fn ensure_allocation_exists(
        &self,
        graph: &mut DagGraph,
        bmem: &BufferMemoryRequirement,
        device: DeviceId,
    ) -> Result<()> {
        let region = region_of(graph, bmem)?;
        if region.has_allocation(device) {
            return Ok(());
        }

        let name = region.name().to_string();
        let bytes = region.allocation_size().ok_or_else(|| {
            RuntimeError::MemoryAllocation(format!(
                "buffer '{name}' of {:?} elements is too large to allocate",
                region.num_elements()
            ))
        })?;
        let allocator = self.registry.allocator(device)?;
        let ptr = allocator
            .allocate(self.options.allocation_alignment, bytes)
            .ok_or_else(|| {
                RuntimeError::MemoryAllocation(format!(
                    "lazy allocation of {bytes} bytes for buffer '{name}' on {device} failed"
                ))
            })?;

        debug!(buffer = %name, %device, bytes, %ptr, "lazily allocated buffer");
        graph
            .region_mut(bmem.region)
            .ok_or(RuntimeError::RegionNotFound(bmem.region))?
            .add_empty_allocation(device, ptr);
        Ok(())
    }

    fn initialize_memory_access(
        &self,
        graph: &mut DagGraph,
        req: NodeId,
        bmem: &BufferMemoryRequirement,
        device: DeviceId,
    ) -> Result<()> {
        let ptr = region_of(graph, bmem)?.get_memory(device);
        if let Operation::Requirement(target) = graph.node_mut(req)?.operation_mut() {
            target.device_data = ptr;
        }
        debug!(node = %req, %device, ptr = ?ptr, "bound device pointer into requirement");
        Ok(())
    }
}

fn region_of<'g>(graph: &'g DagGraph, bmem: &BufferMemoryRequirement) -> Result<&'g DataRegion> {
    graph
        .region(bmem.region)
        .ok_or(RuntimeError::RegionNotFound(bmem.region))
}

/// Transfers that make the requirement's window valid on `device`.
///
/// Each stale rectangle is served by the first update-source candidate; the
/// part of it that candidate does not cover is looked up again.
pub fn plan_transfers(
    region: &DataRegion,
    device: DeviceId,
    bmem: &BufferMemoryRequirement,
) -> Result<Vec<MemcpyOperation>> {
    let mut transfers = Vec::new();

    for outdated in region.get_outdated_regions(device, bmem.offset, bmem.extent) {
        let mut pending = vec![outdated];

        while let Some(piece) = pending.pop() {
            let candidates = region.get_update_source_candidates(device, &piece);
            let Some(&(source, covered)) = candidates.first() else {
                return Err(RuntimeError::NoUpdateSource(format!(
                    "no device holds valid data for offset {:?} extent {:?} of buffer '{}' needed on {}",
                    piece.offset,
                    piece.extent,
                    region.name(),
                    device
                )));
            };

            transfers.push(MemcpyOperation {
                source: MemoryLocation {
                    device: source,
                    offset: covered.offset,
                    region: region.id(),
                },
                dest: MemoryLocation {
                    device,
                    offset: covered.offset,
                    region: region.id(),
                },
                extent: covered.extent,
            });
            pending.extend(piece.subtract(&covered));
        }
    }

    Ok(transfers)
}
