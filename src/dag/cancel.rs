// src/dag/cancel.rs

//! Cancellation of not-yet-submitted work.

use std::collections::HashSet;

use tracing::debug;

use crate::dag::graph::DagGraph;
use crate::dag::node::NodeId;

/// Cancel `root` and every unsubmitted node reachable from it through
/// requirement edges.
///
/// Submitted nodes are left untouched, and the walk does not continue past
/// them: their own requirements were necessarily submitted first. Returns the
/// nodes newly cancelled, root last.
pub fn abort_submission(graph: &mut DagGraph, root: NodeId) -> Vec<NodeId> {
    let mut stack: Vec<NodeId> = graph.requirements_of(root).to_vec();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut cancelled = Vec::new();

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Ok(node) = graph.node_mut(id) else {
            continue;
        };
        if node.is_submitted() || node.is_cancelled() {
            continue;
        }

        if node.cancel() {
            debug!(node = %id, %root, "cancelled unsubmitted requirement");
            cancelled.push(id);
        }
        stack.extend(graph.requirements_of(id).iter().copied());
    }

    if let Ok(node) = graph.node_mut(root) {
        if node.cancel() {
            cancelled.push(root);
        }
    }

    cancelled
}
