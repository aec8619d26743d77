// src/engine/submitted.rs

//! Registry of submitted operations.
//!
//! The scheduler registers every node it finishes submitting so that outside
//! code can wait for all outstanding work (the equivalent of a queue-wide
//! `wait()`), independently of the graph that produced it.

use std::sync::Mutex;

use tracing::debug;

use crate::dag::NodeId;
use crate::exec::event::CompletionHandle;

#[derive(Debug, Default)]
pub struct SubmittedOps {
    ops: Mutex<Vec<(NodeId, Option<CompletionHandle>)>>,
}

impl SubmittedOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted node. Virtually submitted nodes carry no handle.
    pub fn register_submitted_ops(&self, node: NodeId, handle: Option<CompletionHandle>) {
        debug!(%node, has_event = handle.is_some(), "registered submitted node");
        self.lock().push((node, handle));
    }

    /// Number of registered nodes whose work has not completed yet.
    pub fn pending(&self) -> usize {
        self.lock()
            .iter()
            .filter(|(_, h)| h.as_ref().is_some_and(|h| !h.is_complete()))
            .count()
    }

    /// Every node registered so far, in registration order.
    pub fn registered(&self) -> Vec<NodeId> {
        self.lock().iter().map(|(n, _)| *n).collect()
    }

    /// Forget nodes whose work has completed. Returns how many were dropped.
    pub fn purge_completed(&self) -> usize {
        let mut ops = self.lock();
        let before = ops.len();
        ops.retain(|(_, h)| h.as_ref().is_some_and(|h| !h.is_complete()));
        before - ops.len()
    }

    /// Wait for every operation registered before this call.
    pub async fn wait_all(&self) {
        let handles: Vec<CompletionHandle> = self
            .lock()
            .iter()
            .filter_map(|(_, h)| h.clone())
            .collect();

        for handle in handles {
            handle.wait().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(NodeId, Option<CompletionHandle>)>> {
        // A poisoned lock still holds a consistent list; keep using it.
        self.ops.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
