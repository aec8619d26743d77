// src/engine/diagnostics.rs

//! Error observation decoupled from control flow.
//!
//! Failures are returned as `Result`s; an [`ErrorObserver`] only gets a copy
//! for visibility (logs, reports, test assertions).

use std::sync::Mutex;

use crate::dag::NodeId;
use crate::errors::RuntimeError;

pub trait ErrorObserver: Send + Sync {
    /// Called once per aborted submission with the node that was submitted.
    fn on_error(&self, node: NodeId, error: &RuntimeError);
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub node: NodeId,
    pub message: String,
}

/// Observer that keeps every reported error in memory.
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl ErrorObserver for ErrorLog {
    fn on_error(&self, node: NodeId, error: &RuntimeError) {
        let record = ErrorRecord {
            node,
            message: error.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
