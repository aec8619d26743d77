// src/dag/mod.rs

//! Task graph and direct scheduling.
//!
//! - [`graph`] holds the node/region arena.
//! - [`node`] and [`operation`] define what a node is and what it does.
//! - [`resolver`] turns buffer requirements into transfers.
//! - [`scheduler`] contains the direct scheduler.
//! - [`cancel`] cancels unsubmitted work after a failed submission.
//! - [`builder`] builds a graph from a scenario config.

pub mod builder;
pub mod cancel;
pub mod graph;
pub mod node;
pub mod operation;
pub mod resolver;
pub mod scheduler;

pub use cancel::abort_submission;
pub use graph::DagGraph;
pub use node::{DagNode, ExecutionHints, ExecutorBinding, NodeId, NodeStatus, SubmissionState};
pub use operation::{
    BufferMemoryRequirement, KernelOperation, MemcpyOperation, MemoryLocation, Operation,
};
pub use resolver::{RequirementResolver, Resolution};
pub use scheduler::{DirectScheduler, SchedulerOptions};
