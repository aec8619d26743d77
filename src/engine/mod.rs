// src/engine/mod.rs

//! Orchestration around the scheduler.
//!
//! This module ties together:
//! - the registry of submitted operations (queue-wide waiting)
//! - error observation for aborted submissions
//! - the scenario runtime that drives a whole graph through the scheduler

pub mod diagnostics;
pub mod runtime;
pub mod submitted;

pub use diagnostics::{ErrorLog, ErrorObserver, ErrorRecord};
pub use runtime::{
    BufferDeviceReport, BufferReport, FailedSubmission, NodeReport, RunReport, Runtime,
    RuntimeOptions, SubmissionSummary, build_sim_registry,
};
pub use submitted::SubmittedOps;
