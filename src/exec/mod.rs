// src/exec/mod.rs

//! Execution layer.
//!
//! The scheduler only decides *what* runs *where* and after *what*; actually
//! running operations is the job of a backend.
//!
//! - [`backend`] defines the `Backend`, `Allocator` and `Executor` traits and
//!   the registry the scheduler is given.
//! - [`event`] contains the completion handles executors return.
//! - [`sim`] is an in-process backend that simulates devices with tokio
//!   tasks.

pub mod backend;
pub mod event;
pub mod sim;

pub use backend::{Allocator, Backend, BackendRegistry, Dependency, DispatchRequest, Executor};
pub use event::{CompletionHandle, CompletionSignal};
pub use sim::{DispatchJournal, DispatchRecord, SimAllocator, SimBackend, SimDeviceSpec, SimExecutor};
