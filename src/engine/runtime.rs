// src/engine/runtime.rs

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::model::{DeviceConfig, ScenarioFile};
use crate::config::validate::declared_devices;
use crate::dag::builder::{BuiltGraph, build_graph};
use crate::dag::scheduler::{DirectScheduler, SchedulerOptions};
use crate::dag::{DagGraph, NodeId, NodeStatus};
use crate::engine::diagnostics::ErrorLog;
use crate::errors::{Result, RuntimeError};
use crate::exec::backend::BackendRegistry;
use crate::exec::sim::{DispatchJournal, SimBackend, SimDeviceSpec};
use crate::memory::Rect;
use crate::types::{BackendId, DeviceId};

/// Options that influence how the runtime behaves.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Submit only this node and its ancestors.
    pub only: Option<String>,
}

/// Drives one scenario: builds the graph, submits every node through the
/// direct scheduler, waits for the dispatched work and reports.
///
/// Responsibilities:
/// - Own the task graph built from the scenario.
/// - Seed the initial buffer contents.
/// - Submit nodes in order, continuing past failed submissions.
/// - Wait for all submitted operations.
pub struct Runtime {
    built: BuiltGraph,
    scheduler: DirectScheduler,
    errors: Arc<ErrorLog>,
    journal: Option<Arc<DispatchJournal>>,
    options: RuntimeOptions,
}

/// Outcome of the submission phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub submitted: Vec<String>,
    pub failed: Vec<FailedSubmission>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSubmission {
    pub name: String,
    pub message: String,
}

impl Runtime {
    /// Runtime over simulated devices, one per `[device]` entry plus the host.
    pub fn from_config(cfg: &ScenarioFile, runtime: Handle) -> Result<Self> {
        let journal = Arc::new(DispatchJournal::new());
        let registry = build_sim_registry(cfg, runtime, Arc::clone(&journal))?;
        let mut this = Self::with_registry(cfg, registry)?;
        this.journal = Some(journal);
        Ok(this)
    }

    /// Runtime over caller-provided backends.
    pub fn with_registry(cfg: &ScenarioFile, registry: BackendRegistry) -> Result<Self> {
        let mut built = build_graph(cfg)?;
        let options = SchedulerOptions {
            allocation_alignment: cfg.runtime.allocation_alignment,
        };

        seed_initial_data(&mut built, cfg, &registry, &options)?;

        let errors = Arc::new(ErrorLog::new());
        let scheduler = DirectScheduler::new(Arc::new(registry))
            .with_options(options)
            .with_observer(errors.clone());

        info!(
            nodes = built.nodes.len(),
            graph_nodes = built.graph.len(),
            buffers = built.buffers.len(),
            "scenario graph built"
        );

        Ok(Self {
            built,
            scheduler,
            errors,
            journal: None,
            options: RuntimeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &DagGraph {
        &self.built.graph
    }

    pub fn built(&self) -> &BuiltGraph {
        &self.built
    }

    pub fn scheduler(&self) -> &DirectScheduler {
        &self.scheduler
    }

    pub fn error_log(&self) -> &Arc<ErrorLog> {
        &self.errors
    }

    /// Dispatch journal of the simulated backend, when running on it.
    pub fn journal(&self) -> Option<&Arc<DispatchJournal>> {
        self.journal.as_ref()
    }

    /// Scenario nodes that will be submitted, in submission order.
    pub fn submission_plan(&self) -> Result<Vec<String>> {
        let Some(root) = &self.options.only else {
            return Ok(self.built.order.clone());
        };

        let root_id = self.built.node_id(root).ok_or_else(|| {
            RuntimeError::ConfigError(format!("unknown node '{root}' requested"))
        })?;
        let mut wanted: HashSet<NodeId> = self.built.graph.ancestors_of(root_id).into_iter().collect();
        wanted.insert(root_id);

        Ok(self
            .built
            .order
            .iter()
            .filter(|name| self.built.node_id(name).is_some_and(|id| wanted.contains(&id)))
            .cloned()
            .collect())
    }

    /// Submit every planned node. A failed submission is recorded and the
    /// remaining nodes are still attempted.
    pub fn submit_all(&mut self) -> Result<SubmissionSummary> {
        let plan = self.submission_plan()?;
        let mut summary = SubmissionSummary::default();

        for name in plan {
            let id = self
                .built
                .node_id(&name)
                .ok_or_else(|| RuntimeError::ConfigError(format!("unknown node '{name}'")))?;

            match self.scheduler.submit(&mut self.built.graph, id) {
                Ok(()) => {
                    debug!(node = %id, name = %name, "scenario node submitted");
                    summary.submitted.push(name);
                }
                Err(err) => {
                    warn!(node = %id, name = %name, error = %err, "scenario node failed to submit");
                    summary.failed.push(FailedSubmission {
                        name,
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    /// Submit everything, wait for completion and report.
    pub async fn run(&mut self) -> Result<RunReport> {
        info!("dagrt runtime started");

        let summary = self.submit_all()?;
        if !summary.failed.is_empty() {
            error!(failed = summary.failed.len(), "some submissions failed");
        }

        let pending = self.scheduler.submitted_ops().pending();
        debug!(pending, "waiting for submitted operations");
        self.scheduler.submitted_ops().wait_all().await;

        info!("dagrt runtime exiting");
        Ok(self.report(&summary))
    }

    pub fn report(&self, summary: &SubmissionSummary) -> RunReport {
        let graph = &self.built.graph;

        let nodes = self
            .built
            .order
            .iter()
            .filter_map(|name| {
                let id = self.built.node_id(name)?;
                let node = graph.node(id)?;
                Some(NodeReport {
                    name: name.clone(),
                    id,
                    status: node.status(),
                    device: node.assigned_device(),
                })
            })
            .collect();

        let buffers = self
            .built
            .buffers
            .iter()
            .filter_map(|(name, id)| {
                let region = graph.region(*id)?;
                let devices = region
                    .devices()
                    .map(|device| BufferDeviceReport {
                        device,
                        valid: region.valid_ranges(device).to_vec(),
                        current: region.current_ranges(device).to_vec(),
                    })
                    .collect();
                Some(BufferReport {
                    name: name.clone(),
                    devices,
                })
            })
            .collect();

        let (dispatches, transfers) = match &self.journal {
            Some(journal) => (journal.len(), journal.transfer_count()),
            None => (0, 0),
        };

        RunReport {
            nodes,
            failures: summary.failed.clone(),
            dispatches,
            transfers,
            buffers,
        }
    }
}

/// One simulated backend per backend kind present in the scenario.
pub fn build_sim_registry(
    cfg: &ScenarioFile,
    runtime: Handle,
    journal: Arc<DispatchJournal>,
) -> Result<BackendRegistry> {
    let configured: BTreeMap<DeviceId, &DeviceConfig> = cfg
        .device
        .iter()
        .filter_map(|(name, device)| name.parse::<DeviceId>().ok().map(|id| (id, device)))
        .collect();
    let default_device = DeviceConfig::default();

    let mut backends: BTreeMap<BackendId, SimBackend> = BTreeMap::new();
    for device in declared_devices(cfg)? {
        let config = configured.get(&device).copied().unwrap_or(&default_device);
        let spec = SimDeviceSpec {
            device,
            memory: config.memory,
            latency: Duration::from_millis(config.latency_ms),
        };
        backends
            .entry(device.backend)
            .or_insert_with(|| SimBackend::new(device.backend, runtime.clone(), Arc::clone(&journal)))
            .add_device(spec);
    }

    let mut registry = BackendRegistry::new();
    for (_, backend) in backends {
        registry.register(Arc::new(backend));
    }
    Ok(registry)
}

/// Allocate every buffer that declares an `initial_device` there and mark
/// its whole range current.
fn seed_initial_data(
    built: &mut BuiltGraph,
    cfg: &ScenarioFile,
    registry: &BackendRegistry,
    options: &SchedulerOptions,
) -> Result<()> {
    for (name, buffer) in cfg.buffer.iter() {
        let Some(initial) = &buffer.initial_device else {
            continue;
        };
        let device: DeviceId = initial.parse().map_err(|e| {
            RuntimeError::ConfigError(format!("buffer '{name}' initial_device: {e}"))
        })?;
        let id = built.buffers.get(name).copied().ok_or_else(|| {
            RuntimeError::ConfigError(format!("buffer '{name}' was not built"))
        })?;
        let region = built
            .graph
            .region_mut(id)
            .ok_or(RuntimeError::RegionNotFound(id))?;

        let bytes = region.allocation_size().ok_or_else(|| {
            RuntimeError::MemoryAllocation(format!(
                "buffer '{name}' of {:?} elements is too large to allocate",
                region.num_elements()
            ))
        })?;
        let ptr = registry
            .allocator(device)?
            .allocate(options.allocation_alignment, bytes)
            .ok_or_else(|| {
                RuntimeError::MemoryAllocation(format!(
                    "initial allocation of {bytes} bytes for buffer '{name}' on {device} failed"
                ))
            })?;

        region.add_empty_allocation(device, ptr);
        let full = region.full_range();
        region.mark_range_current(device, full.offset, full.extent);
        debug!(buffer = %name, %device, bytes, %ptr, "seeded initial buffer contents");
    }
    Ok(())
}

/// Final state of one scenario node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub name: String,
    pub id: NodeId,
    pub status: NodeStatus,
    pub device: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDeviceReport {
    pub device: DeviceId,
    pub valid: Vec<Rect>,
    pub current: Vec<Rect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferReport {
    pub name: String,
    pub devices: Vec<BufferDeviceReport>,
}

/// Everything printed after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub nodes: Vec<NodeReport>,
    pub failures: Vec<FailedSubmission>,
    /// Operations handed to executors, transfers included.
    pub dispatches: usize,
    pub transfers: usize,
    pub buffers: Vec<BufferReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.status)
    }

    pub fn buffer(&self, name: &str) -> Option<&BufferReport> {
        self.buffers.iter().find(|b| b.name == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes ({}):", self.nodes.len())?;
        for node in self.nodes.iter() {
            match node.device {
                Some(device) => writeln!(f, "  - {} [{}] on {}", node.name, node.status, device)?,
                None => writeln!(f, "  - {} [{}]", node.name, node.status)?,
            }
        }

        writeln!(
            f,
            "dispatched {} operations ({} transfers)",
            self.dispatches, self.transfers
        )?;

        if !self.failures.is_empty() {
            writeln!(f, "failures ({}):", self.failures.len())?;
            for failure in self.failures.iter() {
                writeln!(f, "  - {}: {}", failure.name, failure.message)?;
            }
        }

        writeln!(f, "buffers ({}):", self.buffers.len())?;
        for buffer in self.buffers.iter() {
            writeln!(f, "  - {}", buffer.name)?;
            for entry in buffer.devices.iter() {
                writeln!(
                    f,
                    "      {}: valid {} current {}",
                    entry.device,
                    join_rects(&entry.valid),
                    join_rects(&entry.current)
                )?;
            }
        }
        Ok(())
    }
}

fn join_rects(rects: &[Rect]) -> String {
    if rects.is_empty() {
        return "-".to_string();
    }
    rects
        .iter()
        .map(Rect::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
