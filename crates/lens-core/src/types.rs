//! Canonical scenario types
//!
//! A [`Scenario`] is the only shape the scoring and recommendation layers see.
//! Every [`GpuRecord`] is fully populated; ingestion substitutes defaults for
//! anything it could not observe.

use crate::topology::TopologyOverlay;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// GPU identifier, unique within a scenario
pub type GpuId = u32;

/// Snapshot of one physical or virtual GPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuRecord {
    /// GPU index
    pub id: GpuId,

    /// Compute utilization percentage (0-100)
    pub gpu_util: f64,

    /// Used VRAM in GB
    pub vram_used_gb: f64,

    /// Interconnect/network saturation proxy (0.0 to 1.0)
    pub network_io_score: f64,

    /// NUMA node the GPU is local to
    pub numa_node: u32,

    /// CPU socket nearest the GPU's PCIe link
    pub cpu_socket: u32,

    /// NVLink connectivity cluster label
    pub nvlink_group: String,
}

impl GpuRecord {
    /// Create a record with the given id and idle, single-group defaults
    pub fn new(id: GpuId) -> Self {
        Self {
            id,
            gpu_util: 0.0,
            vram_used_gb: 0.0,
            network_io_score: 0.2,
            numa_node: id % 2,
            cpu_socket: id % 2,
            nvlink_group: "A".to_string(),
        }
    }

    pub fn with_util(mut self, gpu_util: f64) -> Self {
        self.gpu_util = gpu_util;
        self
    }

    pub fn with_vram_used_gb(mut self, vram_used_gb: f64) -> Self {
        self.vram_used_gb = vram_used_gb;
        self
    }

    pub fn with_network_io_score(mut self, score: f64) -> Self {
        self.network_io_score = score;
        self
    }

    pub fn with_placement(mut self, numa_node: u32, cpu_socket: u32) -> Self {
        self.numa_node = numa_node;
        self.cpu_socket = cpu_socket;
        self
    }

    pub fn with_nvlink_group(mut self, group: impl Into<String>) -> Self {
        self.nvlink_group = group.into();
        self
    }
}

/// Named, point-in-time snapshot of a GPU fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Display name
    pub name: String,

    /// Largest per-GPU total VRAM observed, in whole GB (at least 1)
    pub total_vram_gb: u32,

    /// GPU records in ingestion order
    pub gpus: Vec<GpuRecord>,
}

impl Scenario {
    /// Create a new scenario
    pub fn new(name: impl Into<String>, total_vram_gb: u32, gpus: Vec<GpuRecord>) -> Self {
        Self {
            name: name.into(),
            total_vram_gb: total_vram_gb.max(1),
            gpus,
        }
    }

    /// Look up a GPU by id
    pub fn gpu(&self, id: GpuId) -> Option<&GpuRecord> {
        self.gpus.iter().find(|g| g.id == id)
    }

    /// Number of GPUs in the scenario
    pub fn len(&self) -> usize {
        self.gpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gpus.is_empty()
    }

    /// GPU ids per NVLink group label, each list sorted
    pub fn nvlink_groups(&self) -> BTreeMap<String, Vec<GpuId>> {
        let mut groups: BTreeMap<String, Vec<GpuId>> = BTreeMap::new();
        for gpu in &self.gpus {
            groups.entry(gpu.nvlink_group.clone()).or_default().push(gpu.id);
        }
        for ids in groups.values_mut() {
            ids.sort_unstable();
        }
        groups
    }

    /// GPU ids per NUMA node, each list sorted
    pub fn numa_nodes(&self) -> BTreeMap<u32, Vec<GpuId>> {
        let mut nodes: BTreeMap<u32, Vec<GpuId>> = BTreeMap::new();
        for gpu in &self.gpus {
            nodes.entry(gpu.numa_node).or_default().push(gpu.id);
        }
        for ids in nodes.values_mut() {
            ids.sort_unstable();
        }
        nodes
    }

    /// Produce a new scenario with the overlay's topology applied
    pub fn with_topology(&self, overlay: &TopologyOverlay) -> Scenario {
        overlay.apply(self)
    }
}
