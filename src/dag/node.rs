// src/dag/node.rs

//! DAG nodes and their submission lifecycle.

use std::fmt;

use tracing::{debug, warn};

use crate::dag::operation::Operation;
use crate::exec::event::CompletionHandle;
use crate::types::{BackendId, DeviceId};

/// Stable identifier of a node inside a [`crate::dag::DagGraph`].
///
/// Ids are handed out in increasing order and never reused, so sorting by id
/// gives a canonical order for dependency lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Submission state (internal). `Complete` is not stored here; it is read off
/// the completion handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Unsubmitted,
    /// Nothing had to be executed to satisfy the node.
    VirtuallySubmitted,
    /// Handed to an executor; holds a completion handle.
    Submitted,
    Cancelled,
}

/// Public, read-only view of a node's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Unsubmitted,
    VirtuallySubmitted,
    Submitted,
    Complete,
    Cancelled,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Unsubmitted => "unsubmitted",
            NodeStatus::VirtuallySubmitted => "virtual",
            NodeStatus::Submitted => "submitted",
            NodeStatus::Complete => "complete",
            NodeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-node scheduling hints. The direct scheduler reads only
/// `bind_to_device`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionHints {
    bind_to_device: Option<DeviceId>,
}

impl ExecutionHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_to_device(device: DeviceId) -> Self {
        Self {
            bind_to_device: Some(device),
        }
    }

    pub fn bound_device(&self) -> Option<DeviceId> {
        self.bind_to_device
    }
}

/// Executor a node was dispatched to: the backend that executed it and the
/// device it was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorBinding {
    pub backend: BackendId,
    pub device: DeviceId,
}

#[derive(Debug, Clone)]
pub struct DagNode {
    id: NodeId,
    operation: Operation,
    requirements: Vec<NodeId>,
    hints: ExecutionHints,
    assigned_device: Option<DeviceId>,
    assigned_executor: Option<ExecutorBinding>,
    state: SubmissionState,
    event: Option<CompletionHandle>,
}

impl DagNode {
    pub(crate) fn new(
        id: NodeId,
        operation: Operation,
        requirements: Vec<NodeId>,
        hints: ExecutionHints,
    ) -> Self {
        Self {
            id,
            operation,
            requirements,
            hints,
            assigned_device: None,
            assigned_executor: None,
            state: SubmissionState::Unsubmitted,
            event: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub(crate) fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    pub fn requirements(&self) -> &[NodeId] {
        &self.requirements
    }

    pub fn hints(&self) -> &ExecutionHints {
        &self.hints
    }

    pub fn assigned_device(&self) -> Option<DeviceId> {
        self.assigned_device
    }

    pub fn assigned_executor(&self) -> Option<ExecutorBinding> {
        self.assigned_executor
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn event(&self) -> Option<&CompletionHandle> {
        self.event.as_ref()
    }

    /// True for both real and virtual submission.
    pub fn is_submitted(&self) -> bool {
        matches!(
            self.state,
            SubmissionState::Submitted | SubmissionState::VirtuallySubmitted
        )
    }

    pub fn is_virtual(&self) -> bool {
        self.state == SubmissionState::VirtuallySubmitted
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == SubmissionState::Cancelled
    }

    /// Virtual nodes are complete immediately; submitted nodes once their
    /// handle fires.
    pub fn is_complete(&self) -> bool {
        match self.state {
            SubmissionState::VirtuallySubmitted => true,
            SubmissionState::Submitted => self.event.as_ref().is_some_and(|e| e.is_complete()),
            SubmissionState::Unsubmitted | SubmissionState::Cancelled => false,
        }
    }

    pub fn status(&self) -> NodeStatus {
        match self.state {
            SubmissionState::Unsubmitted => NodeStatus::Unsubmitted,
            SubmissionState::VirtuallySubmitted => NodeStatus::VirtuallySubmitted,
            SubmissionState::Submitted if self.is_complete() => NodeStatus::Complete,
            SubmissionState::Submitted => NodeStatus::Submitted,
            SubmissionState::Cancelled => NodeStatus::Cancelled,
        }
    }

    /// Bind the node to a device. An existing assignment is never changed.
    pub(crate) fn assign_to_device(&mut self, device: DeviceId) {
        match self.assigned_device {
            None => self.assigned_device = Some(device),
            Some(existing) if existing != device => {
                debug!(
                    node = %self.id,
                    %existing,
                    requested = %device,
                    "node already bound to a device; keeping existing assignment"
                );
            }
            Some(_) => {}
        }
    }

    pub(crate) fn assign_to_executor(&mut self, binding: ExecutorBinding) {
        if self.assigned_executor.is_none() {
            self.assigned_executor = Some(binding);
        }
    }

    pub(crate) fn mark_submitted(&mut self, event: CompletionHandle) {
        debug_assert_eq!(self.state, SubmissionState::Unsubmitted);
        self.state = SubmissionState::Submitted;
        self.event = Some(event);
    }

    pub(crate) fn mark_virtually_submitted(&mut self) {
        debug_assert_eq!(self.state, SubmissionState::Unsubmitted);
        self.state = SubmissionState::VirtuallySubmitted;
    }

    /// Only unsubmitted nodes can be cancelled; dispatched work is never
    /// aborted.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.state {
            SubmissionState::Unsubmitted => {
                self.state = SubmissionState::Cancelled;
                true
            }
            SubmissionState::Cancelled => false,
            SubmissionState::Submitted | SubmissionState::VirtuallySubmitted => {
                warn!(node = %self.id, "refusing to cancel a node that was already submitted");
                false
            }
        }
    }
}
