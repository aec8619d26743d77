#![allow(dead_code)]

use std::collections::BTreeMap;

use dagrt::config::{
    AccessConfig, BufferConfig, CopyConfig, DeviceConfig, NodeConfig, RuntimeSection, ScenarioFile,
};
use dagrt::dag::DagGraph;
use dagrt::memory::DataRegionId;
use dagrt::types::{BackendId, DeviceId, DevicePtr};

/// Builder for `ScenarioFile` to simplify test setup.
pub struct ScenarioBuilder {
    scenario: ScenarioFile,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self {
            scenario: ScenarioFile {
                runtime: RuntimeSection::default(),
                device: BTreeMap::new(),
                buffer: BTreeMap::new(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_device(mut self, id: &str, memory: usize, latency_ms: u64) -> Self {
        self.scenario
            .device
            .insert(id.to_string(), DeviceConfig { memory, latency_ms });
        self
    }

    pub fn with_buffer(mut self, name: &str, element_size: usize, range: &[usize], initial_device: Option<&str>) -> Self {
        self.scenario.buffer.insert(
            name.to_string(),
            BufferConfig {
                element_size,
                range: range.to_vec(),
                initial_device: initial_device.map(str::to_string),
            },
        );
        self
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.scenario.node.insert(name.to_string(), node);
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.scenario.runtime.allocation_alignment = alignment;
        self
    }

    pub fn build(self) -> ScenarioFile {
        self.scenario
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn kernel(name: &str) -> Self {
        Self {
            node: NodeConfig {
                kernel: Some(name.to_string()),
                ..NodeConfig::default()
            },
        }
    }

    pub fn copy(buffer: &str, from: &str, to: &str) -> Self {
        Self {
            node: NodeConfig {
                copy: Some(CopyConfig {
                    buffer: buffer.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                    offset: None,
                    extent: None,
                }),
                ..NodeConfig::default()
            },
        }
    }

    pub fn device(mut self, device: &str) -> Self {
        self.node.device = Some(device.to_string());
        self
    }

    pub fn preferred_backend(mut self, backend: &str) -> Self {
        self.node.preferred_backend = Some(backend.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    /// Access covering the whole buffer.
    pub fn access(mut self, buffer: &str, mode: &str) -> Self {
        self.node.access.push(AccessConfig {
            buffer: buffer.to_string(),
            mode: mode.to_string(),
            offset: None,
            extent: None,
        });
        self
    }

    pub fn access_window(mut self, buffer: &str, mode: &str, offset: &[usize], extent: &[usize]) -> Self {
        self.node.access.push(AccessConfig {
            buffer: buffer.to_string(),
            mode: mode.to_string(),
            offset: Some(offset.to_vec()),
            extent: Some(extent.to_vec()),
        });
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

pub fn host() -> DeviceId {
    DeviceId::host()
}

pub fn cuda(index: u32) -> DeviceId {
    DeviceId::new(BackendId::Cuda, index)
}

pub fn hip(index: u32) -> DeviceId {
    DeviceId::new(BackendId::Hip, index)
}

/// Give `device` an allocation of `region` holding the current contents of
/// the whole buffer, as if the data had been placed there initially.
pub fn seed_region(graph: &mut DagGraph, region: DataRegionId, device: DeviceId) {
    let data = graph.region_mut(region).expect("region must exist");
    let ptr = DevicePtr(0xdead_0000 + u64::from(device.index) * 0x1_0000);
    data.add_empty_allocation(device, ptr);
    let full = data.full_range();
    data.mark_range_current(device, full.offset, full.extent);
}
