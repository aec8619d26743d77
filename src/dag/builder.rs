// src/dag/builder.rs

//! Build a task graph from a validated scenario.
//!
//! Every buffer becomes a data region. Every scenario node becomes one
//! explicit node plus one requirement node per buffer access. Requirement
//! nodes carry the buffer hazards:
//!
//! - every access depends on the buffer's last writer
//! - write-capable accesses also depend on every reader since that write
//!
//! An explicit copy reads its window on the source device and discards it on
//! the destination device, so it gets two requirements.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use tracing::debug;

use crate::config::model::{NodeConfig, ScenarioFile};
use crate::config::validate::after_graph;
use crate::dag::graph::DagGraph;
use crate::dag::node::{ExecutionHints, NodeId};
use crate::dag::operation::{KernelOperation, MemcpyOperation, MemoryLocation, Operation};
use crate::errors::{Result, RuntimeError};
use crate::memory::{DataRegionId, Id3, Range3};
use crate::types::{AccessMode, BackendId, DeviceId};

/// A graph built from a scenario, plus the name mappings the runtime needs.
#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: DagGraph,
    /// Scenario node name -> explicit node.
    pub nodes: BTreeMap<String, NodeId>,
    /// Scenario buffer name -> region.
    pub buffers: BTreeMap<String, DataRegionId>,
    /// Scenario node names in submission order.
    pub order: Vec<String>,
}

impl BuiltGraph {
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    /// Scenario name of an explicit node.
    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(_, node)| **node == id)
            .map(|(name, _)| name.as_str())
    }
}

/// Readers and last writer of one buffer, in submission order.
#[derive(Debug, Default)]
struct BufferHazards {
    last_writer: Option<NodeId>,
    readers: Vec<NodeId>,
}

/// One access a scenario node makes, already resolved to graph terms.
#[derive(Debug, Clone, Copy)]
struct PlannedAccess {
    region: DataRegionId,
    offset: Id3,
    extent: Range3,
    mode: AccessMode,
    /// Overrides the node's own binding (copy endpoints).
    device: Option<DeviceId>,
}

/// Build the task graph for `cfg`. The scenario is expected to be validated;
/// anything validation would have caught is reported as a `ConfigError`.
pub fn build_graph(cfg: &ScenarioFile) -> Result<BuiltGraph> {
    let mut graph = DagGraph::new();

    let mut buffers = BTreeMap::new();
    for (name, buffer) in cfg.buffer.iter() {
        let range = buffer.num_elements().ok_or_else(|| {
            RuntimeError::ConfigError(format!("buffer '{name}' has an invalid range"))
        })?;
        let region = graph.add_region(name.clone(), range, buffer.element_size);
        buffers.insert(name.clone(), region);
    }

    let order = submission_order(cfg)?;

    let mut hazards: BTreeMap<DataRegionId, BufferHazards> = BTreeMap::new();
    let mut nodes: BTreeMap<String, NodeId> = BTreeMap::new();

    for name in order.iter() {
        let node = cfg
            .node
            .get(name)
            .ok_or_else(|| RuntimeError::ConfigError(format!("unknown node '{name}'")))?;

        let hints = match &node.device {
            Some(device) => ExecutionHints::bind_to_device(parse_device(name, device)?),
            None => ExecutionHints::new(),
        };

        let mut requirements: Vec<NodeId> = Vec::new();
        for dep in node.after.iter() {
            let id = nodes.get(dep).copied().ok_or_else(|| {
                RuntimeError::ConfigError(format!(
                    "node '{name}' depends on '{dep}', which has not been built"
                ))
            })?;
            requirements.push(id);
        }

        let accesses = plan_accesses(cfg, &buffers, name, node)?;
        for access in accesses.iter() {
            let state = hazards.entry(access.region).or_default();
            let mut deps: BTreeSet<NodeId> = state.last_writer.into_iter().collect();
            if access.mode.is_write() {
                deps.extend(state.readers.iter().copied());
            }

            let access_hints = match access.device {
                Some(device) => ExecutionHints::bind_to_device(device),
                None => hints,
            };
            let req = graph.add_buffer_requirement(
                access.region,
                access.offset,
                access.extent,
                access.mode,
                deps.into_iter().collect(),
                access_hints,
            )?;
            requirements.push(req);
        }

        let operation = operation_for(cfg, &buffers, name, node)?;
        let id = graph.add_node(operation, requirements, hints)?;
        debug!(node = %id, name = %name, accesses = accesses.len(), "built scenario node");

        for access in accesses.iter() {
            let state = hazards.entry(access.region).or_default();
            if access.mode.is_write() {
                state.last_writer = Some(id);
                state.readers.clear();
            } else if !state.readers.contains(&id) {
                state.readers.push(id);
            }
        }

        nodes.insert(name.clone(), id);
    }

    Ok(BuiltGraph {
        graph,
        nodes,
        buffers,
        order,
    })
}

/// Topological order of the `after` edges.
fn submission_order(cfg: &ScenarioFile) -> Result<Vec<String>> {
    let graph = after_graph(cfg);
    let order = toposort(&graph, None).map_err(|cycle| {
        RuntimeError::DagCycle(format!(
            "cycle detected in node graph involving node '{}'",
            cycle.node_id()
        ))
    })?;
    Ok(order.into_iter().map(str::to_string).collect())
}

fn plan_accesses(
    cfg: &ScenarioFile,
    buffers: &BTreeMap<String, DataRegionId>,
    name: &str,
    node: &NodeConfig,
) -> Result<Vec<PlannedAccess>> {
    if let Some(copy) = &node.copy {
        let (region, range) = lookup_buffer(cfg, buffers, name, &copy.buffer)?;
        let (offset, extent) = copy
            .window(range)
            .ok_or_else(|| bad_window(name, &copy.buffer))?;
        return Ok(vec![
            PlannedAccess {
                region,
                offset,
                extent,
                mode: AccessMode::Read,
                device: Some(parse_device(name, &copy.from)?),
            },
            PlannedAccess {
                region,
                offset,
                extent,
                mode: AccessMode::DiscardWrite,
                device: Some(parse_device(name, &copy.to)?),
            },
        ]);
    }

    node.access
        .iter()
        .map(|access| {
            let (region, range) = lookup_buffer(cfg, buffers, name, &access.buffer)?;
            let (offset, extent) = access
                .window(range)
                .ok_or_else(|| bad_window(name, &access.buffer))?;
            let mode: AccessMode = access.mode.parse().map_err(|e| {
                RuntimeError::ConfigError(format!("node '{name}' access mode: {e}"))
            })?;
            Ok(PlannedAccess {
                region,
                offset,
                extent,
                mode,
                device: None,
            })
        })
        .collect()
}

fn operation_for(
    cfg: &ScenarioFile,
    buffers: &BTreeMap<String, DataRegionId>,
    name: &str,
    node: &NodeConfig,
) -> Result<Operation> {
    if let Some(kernel) = &node.kernel {
        let mut op = KernelOperation::new(kernel.clone());
        if let Some(backend) = &node.preferred_backend {
            let backend: BackendId = backend.parse().map_err(|e| {
                RuntimeError::ConfigError(format!("node '{name}' preferred_backend: {e}"))
            })?;
            op = op.with_preferred_backend(backend);
        }
        return Ok(Operation::Kernel(op));
    }

    let copy = node.copy.as_ref().ok_or_else(|| {
        RuntimeError::ConfigError(format!("node '{name}' is neither a kernel nor a copy"))
    })?;
    let (region, range) = lookup_buffer(cfg, buffers, name, &copy.buffer)?;
    let (offset, extent) = copy
        .window(range)
        .ok_or_else(|| bad_window(name, &copy.buffer))?;

    Ok(Operation::MemCopy(MemcpyOperation {
        source: MemoryLocation {
            device: parse_device(name, &copy.from)?,
            offset,
            region,
        },
        dest: MemoryLocation {
            device: parse_device(name, &copy.to)?,
            offset,
            region,
        },
        extent,
    }))
}

fn lookup_buffer(
    cfg: &ScenarioFile,
    buffers: &BTreeMap<String, DataRegionId>,
    node: &str,
    buffer: &str,
) -> Result<(DataRegionId, Range3)> {
    let region = buffers.get(buffer).copied();
    let range = cfg.buffer.get(buffer).and_then(|b| b.num_elements());
    match (region, range) {
        (Some(region), Some(range)) => Ok((region, range)),
        _ => Err(RuntimeError::ConfigError(format!(
            "node '{node}' refers to unknown buffer '{buffer}'"
        ))),
    }
}

fn parse_device(node: &str, raw: &str) -> Result<DeviceId> {
    raw.parse()
        .map_err(|e| RuntimeError::ConfigError(format!("node '{node}': {e}")))
}

fn bad_window(node: &str, buffer: &str) -> RuntimeError {
    RuntimeError::ConfigError(format!(
        "node '{node}' window on buffer '{buffer}' does not fit"
    ))
}
