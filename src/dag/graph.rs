// src/dag/graph.rs

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::dag::node::{DagNode, ExecutionHints, NodeId, NodeStatus};
use crate::dag::operation::{
    BufferMemoryRequirement, KernelOperation, MemcpyOperation, Operation,
};
use crate::errors::{Result, RuntimeError};
use crate::memory::{DataRegion, DataRegionId, Id3, Range3, ValiditySnapshot};
use crate::types::{AccessMode, DevicePtr};

/// Arena owning every node and data region of a task graph.
///
/// Edges are stored as `NodeId` lists on the dependent node. A node can only
/// name requirements that already exist, so the graph is acyclic by
/// construction. Nodes shared by several dependents are simply listed by all
/// of them.
#[derive(Debug, Default)]
pub struct DagGraph {
    nodes: BTreeMap<NodeId, DagNode>,
    regions: Vec<DataRegion>,
    next_id: u64,
}

impl DagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the coherence record for a new logical buffer.
    pub fn add_region(
        &mut self,
        name: impl Into<String>,
        num_elements: Range3,
        element_size: usize,
    ) -> DataRegionId {
        let id = DataRegionId(self.regions.len());
        self.regions
            .push(DataRegion::new(id, name, num_elements, element_size));
        id
    }

    pub fn region(&self, id: DataRegionId) -> Option<&DataRegion> {
        self.regions.get(id.0)
    }

    pub fn region_mut(&mut self, id: DataRegionId) -> Option<&mut DataRegion> {
        self.regions.get_mut(id.0)
    }

    pub fn regions(&self) -> impl Iterator<Item = &DataRegion> {
        self.regions.iter()
    }

    /// Validity state of every region, for [`DagGraph::restore_validity`].
    pub fn validity_snapshot(&self) -> Vec<ValiditySnapshot> {
        self.regions.iter().map(DataRegion::validity_snapshot).collect()
    }

    /// Roll every region's valid and current sets back to `snapshot`.
    /// Regions added after the snapshot are left untouched.
    pub fn restore_validity(&mut self, snapshot: Vec<ValiditySnapshot>) {
        for (region, saved) in self.regions.iter_mut().zip(snapshot) {
            region.restore_validity(saved);
        }
    }

    /// Insert a node. Every requirement must already be in the graph.
    pub fn add_node(
        &mut self,
        operation: Operation,
        requirements: Vec<NodeId>,
        hints: ExecutionHints,
    ) -> Result<NodeId> {
        if let Some(missing) = requirements.iter().find(|r| !self.nodes.contains_key(r)) {
            return Err(RuntimeError::NodeNotFound(*missing));
        }
        if let Operation::Requirement(req) = &operation {
            self.check_window(req.region, req.offset, req.extent)?;
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;

        debug!(node = %id, kind = operation.kind(), requirements = requirements.len(), "added node");
        self.nodes
            .insert(id, DagNode::new(id, operation, requirements, hints));
        Ok(id)
    }

    pub fn add_kernel(
        &mut self,
        kernel: KernelOperation,
        requirements: Vec<NodeId>,
        hints: ExecutionHints,
    ) -> Result<NodeId> {
        self.add_node(Operation::Kernel(kernel), requirements, hints)
    }

    pub fn add_copy(
        &mut self,
        copy: MemcpyOperation,
        requirements: Vec<NodeId>,
        hints: ExecutionHints,
    ) -> Result<NodeId> {
        self.check_window(copy.source.region, copy.source.offset, copy.extent)?;
        self.check_window(copy.dest.region, copy.dest.offset, copy.extent)?;
        self.add_node(Operation::MemCopy(copy), requirements, hints)
    }

    /// Declare that a window of `region` must be accessible with `mode`.
    pub fn add_buffer_requirement(
        &mut self,
        region: DataRegionId,
        offset: Id3,
        extent: Range3,
        mode: AccessMode,
        requirements: Vec<NodeId>,
        hints: ExecutionHints,
    ) -> Result<NodeId> {
        let req = BufferMemoryRequirement::new(region, offset, extent, mode);
        self.add_node(Operation::Requirement(req), requirements, hints)
    }

    fn check_window(&self, region: DataRegionId, offset: Id3, extent: Range3) -> Result<()> {
        let data = self
            .region(region)
            .ok_or(RuntimeError::RegionNotFound(region))?;
        if !data.contains_window(offset, extent) {
            return Err(RuntimeError::InvalidAccess(format!(
                "window offset {:?} extent {:?} exceeds buffer '{}' of {:?} elements",
                offset,
                extent,
                data.name(),
                data.num_elements()
            )));
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&DagNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut DagNode> {
        self.nodes.get_mut(&id).ok_or(RuntimeError::NodeNotFound(id))
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Result<&DagNode> {
        self.nodes.get(&id).ok_or(RuntimeError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Immediate requirements of a node.
    pub fn requirements_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.requirements())
            .unwrap_or(&[])
    }

    pub fn status_of(&self, id: NodeId) -> Option<NodeStatus> {
        self.nodes.get(&id).map(DagNode::status)
    }

    /// Device pointer bound into a buffer requirement during resolution.
    pub fn device_pointer_of(&self, id: NodeId) -> Option<DevicePtr> {
        self.nodes
            .get(&id)?
            .operation()
            .as_requirement()?
            .device_data
    }

    /// All nodes reachable from `root` through requirement edges, root
    /// excluded, in depth-first discovery order.
    pub fn ancestors_of(&self, root: NodeId) -> Vec<NodeId> {
        let mut stack: Vec<NodeId> = self.requirements_of(root).to_vec();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut order = Vec::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.requirements_of(id).iter().copied());
        }

        order
    }

    /// Drop nodes that are finished (complete or cancelled) and that no live
    /// node still lists as a requirement. Returns how many were removed.
    ///
    /// Retired nodes may keep requirement ids of removed nodes; lookups of a
    /// removed id treat it as finished.
    pub fn prune_retired(&mut self) -> usize {
        let referenced: HashSet<NodeId> = self
            .nodes
            .values()
            .filter(|n| !is_retired(n))
            .flat_map(|n| n.requirements().iter().copied())
            .collect();

        let before = self.nodes.len();
        self.nodes
            .retain(|id, node| !is_retired(node) || referenced.contains(id));
        let removed = before - self.nodes.len();

        if removed > 0 {
            debug!(removed, remaining = self.nodes.len(), "pruned retired nodes");
        }
        removed
    }
}

fn is_retired(node: &DagNode) -> bool {
    node.is_complete() || node.is_cancelled()
}
