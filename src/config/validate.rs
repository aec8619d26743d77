// src/config/validate.rs

use std::collections::BTreeSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{NodeConfig, ScenarioFile};
use crate::errors::{Result, RuntimeError};
use crate::memory::{Id3, Range3};
use crate::types::{AccessMode, BackendId, DeviceId};

/// Run semantic validation against a loaded scenario.
///
/// This checks:
/// - there is at least one node
/// - the allocation alignment is a non-zero power of two
/// - device ids parse and every device has memory
/// - buffers have a non-zero element size and range
/// - every node is exactly one of a kernel or a copy
/// - devices, backends, buffers and access modes named by nodes exist
/// - access and copy windows fit inside their buffers
/// - all `after` dependencies refer to existing nodes
/// - the node graph has no cycles
pub fn validate_config(cfg: &ScenarioFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_runtime(cfg)?;
    let devices = validate_devices(cfg)?;
    validate_buffers(cfg, &devices)?;
    for (name, node) in cfg.node.iter() {
        validate_node(cfg, &devices, name, node)?;
    }
    validate_node_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

/// Every device the scenario provides: declared ones plus the implicit host.
pub fn declared_devices(cfg: &ScenarioFile) -> Result<BTreeSet<DeviceId>> {
    let mut devices = BTreeSet::from([DeviceId::host()]);
    for name in cfg.device.keys() {
        let device: DeviceId = name.parse().map_err(|e| {
            RuntimeError::ConfigError(format!("invalid device id '{name}': {e}"))
        })?;
        devices.insert(device);
    }
    Ok(devices)
}

fn ensure_has_nodes(cfg: &ScenarioFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(RuntimeError::ConfigError(
            "scenario must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_runtime(cfg: &ScenarioFile) -> Result<()> {
    let alignment = cfg.runtime.allocation_alignment;
    if !alignment.is_power_of_two() {
        return Err(RuntimeError::ConfigError(format!(
            "[runtime].allocation_alignment must be a power of two (got {alignment})"
        )));
    }
    Ok(())
}

fn validate_devices(cfg: &ScenarioFile) -> Result<BTreeSet<DeviceId>> {
    let devices = declared_devices(cfg)?;
    for (name, device) in cfg.device.iter() {
        if device.memory == 0 {
            return Err(RuntimeError::ConfigError(format!(
                "device '{name}' must have memory > 0"
            )));
        }
    }
    Ok(devices)
}

fn validate_buffers(cfg: &ScenarioFile, devices: &BTreeSet<DeviceId>) -> Result<()> {
    for (name, buffer) in cfg.buffer.iter() {
        if buffer.element_size == 0 {
            return Err(RuntimeError::ConfigError(format!(
                "buffer '{name}' must have element_size > 0"
            )));
        }
        let Some(range) = buffer.num_elements() else {
            return Err(RuntimeError::ConfigError(format!(
                "buffer '{name}' range must have one to three dimensions (got {:?})",
                buffer.range
            )));
        };
        if range.contains(&0) {
            return Err(RuntimeError::ConfigError(format!(
                "buffer '{name}' range must be non-zero in every dimension (got {:?})",
                buffer.range
            )));
        }
        let bytes = range
            .iter()
            .try_fold(buffer.element_size, |bytes, &n| bytes.checked_mul(n));
        if bytes.is_none() {
            return Err(RuntimeError::ConfigError(format!(
                "buffer '{name}' of {:?} elements of {} bytes is too large to allocate",
                buffer.range, buffer.element_size
            )));
        }
        if let Some(initial) = &buffer.initial_device {
            known_device(devices, initial, &format!("buffer '{name}' initial_device"))?;
        }
    }
    Ok(())
}

fn validate_node(
    cfg: &ScenarioFile,
    devices: &BTreeSet<DeviceId>,
    name: &str,
    node: &NodeConfig,
) -> Result<()> {
    match (&node.kernel, &node.copy) {
        (Some(_), Some(_)) => {
            return Err(RuntimeError::ConfigError(format!(
                "node '{name}' must set exactly one of `kernel` or `copy`, not both"
            )));
        }
        (None, None) => {
            return Err(RuntimeError::ConfigError(format!(
                "node '{name}' must set one of `kernel` or `copy`"
            )));
        }
        _ => {}
    }

    if let Some(device) = &node.device {
        known_device(devices, device, &format!("node '{name}' device"))?;
    }
    if let Some(backend) = &node.preferred_backend {
        backend.parse::<BackendId>().map_err(|e| {
            RuntimeError::ConfigError(format!("node '{name}' preferred_backend: {e}"))
        })?;
    }

    for access in node.access.iter() {
        access.mode.parse::<AccessMode>().map_err(|e| {
            RuntimeError::ConfigError(format!(
                "node '{name}' access to '{}': {e}",
                access.buffer
            ))
        })?;
        let range = buffer_range(cfg, name, &access.buffer)?;
        let window = access.window(range);
        check_window(name, &access.buffer, range, window)?;
    }

    if let Some(copy) = &node.copy {
        known_device(devices, &copy.from, &format!("node '{name}' copy source"))?;
        known_device(devices, &copy.to, &format!("node '{name}' copy destination"))?;
        let range = buffer_range(cfg, name, &copy.buffer)?;
        check_window(name, &copy.buffer, range, copy.window(range))?;
    }

    Ok(())
}

fn known_device(devices: &BTreeSet<DeviceId>, raw: &str, what: &str) -> Result<DeviceId> {
    let device: DeviceId = raw
        .parse()
        .map_err(|e| RuntimeError::ConfigError(format!("{what}: {e}")))?;
    if !devices.contains(&device) {
        return Err(RuntimeError::ConfigError(format!(
            "{what} refers to unknown device '{device}'"
        )));
    }
    Ok(device)
}

fn buffer_range(cfg: &ScenarioFile, node: &str, buffer: &str) -> Result<Range3> {
    cfg.buffer
        .get(buffer)
        .and_then(|b| b.num_elements())
        .ok_or_else(|| {
            RuntimeError::ConfigError(format!(
                "node '{node}' refers to unknown buffer '{buffer}'"
            ))
        })
}

fn check_window(
    node: &str,
    buffer: &str,
    range: Range3,
    window: Option<(Id3, Range3)>,
) -> Result<()> {
    let fits = window.is_some_and(|(offset, extent)| {
        (0..3).all(|axis| {
            extent[axis] > 0
                && offset[axis]
                    .checked_add(extent[axis])
                    .is_some_and(|end| end <= range[axis])
        })
    });
    if !fits {
        return Err(RuntimeError::ConfigError(format!(
            "node '{node}' window on buffer '{buffer}' does not fit its range {range:?}"
        )));
    }
    Ok(())
}

fn validate_node_dependencies(cfg: &ScenarioFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            if !cfg.node.contains_key(dep) {
                return Err(RuntimeError::ConfigError(format!(
                    "node '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
            if dep == name {
                return Err(RuntimeError::ConfigError(format!(
                    "node '{name}' cannot depend on itself in `after`"
                )));
            }
        }
    }
    Ok(())
}

/// Cycle check over the `after` edges. Buffer hazard edges are derived by the
/// graph builder along a topological order of these edges, so they cannot
/// close a cycle on their own.
fn validate_dag(cfg: &ScenarioFile) -> Result<()> {
    let graph = after_graph(cfg);
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(RuntimeError::DagCycle(format!(
            "cycle detected in node graph involving node '{}'",
            cycle.node_id()
        ))),
    }
}

/// Edge direction: dependency -> dependent.
pub(crate) fn after_graph(cfg: &ScenarioFile) -> DiGraphMap<&str, ()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }
    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }
    graph
}
