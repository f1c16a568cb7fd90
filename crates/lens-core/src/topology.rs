//! Topology overlay and NUMA affinity types
//!
//! Topology facts come from secondary inputs (`nvidia-smi topo -m`,
//! `numactl --hardware`, or pre-structured equivalents) and are applied on top
//! of the primary telemetry by GPU id.

use crate::types::{GpuId, Scenario};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// NUMA node id → CPU cores local to that node
pub type NodeCpuMap = BTreeMap<u32, BTreeSet<u32>>;

/// Topology facts derived for a single GPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyInfo {
    /// NUMA node the GPU is attached to
    pub numa_node: u32,

    /// CPU socket resolved from the GPU's CPU affinity
    pub cpu_socket: u32,

    /// NVLink connectivity cluster label
    pub nvlink_group: String,

    /// Raw CPU affinity string as reported (e.g. "0-23,48-71")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_affinity: Option<String>,
}

impl TopologyInfo {
    pub fn new(numa_node: u32, cpu_socket: u32, nvlink_group: impl Into<String>) -> Self {
        Self {
            numa_node,
            cpu_socket,
            nvlink_group: nvlink_group.into(),
            cpu_affinity: None,
        }
    }

    pub fn with_cpu_affinity(mut self, affinity: impl Into<String>) -> Self {
        self.cpu_affinity = Some(affinity.into());
        self
    }
}

/// Per-GPU topology facts keyed by GPU id. Partial coverage is legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyOverlay {
    entries: BTreeMap<GpuId, TopologyInfo>,
}

impl TopologyOverlay {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the facts for a GPU
    pub fn insert(&mut self, gpu_id: GpuId, info: TopologyInfo) -> Option<TopologyInfo> {
        self.entries.insert(gpu_id, info)
    }

    pub fn get(&self, gpu_id: GpuId) -> Option<&TopologyInfo> {
        self.entries.get(&gpu_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in ascending GPU id order
    pub fn iter(&self) -> impl Iterator<Item = (GpuId, &TopologyInfo)> {
        self.entries.iter().map(|(id, info)| (*id, info))
    }

    /// Apply the overlay onto a scenario, returning the patched copy.
    ///
    /// GPUs present in the overlay take its `numa_node`, `cpu_socket` and
    /// `nvlink_group`; all other GPUs are copied unchanged. The input scenario
    /// is never modified.
    pub fn apply(&self, scenario: &Scenario) -> Scenario {
        if self.is_empty() {
            return scenario.clone();
        }

        let mut patched = scenario.clone();
        let mut applied = 0usize;
        for gpu in &mut patched.gpus {
            if let Some(info) = self.entries.get(&gpu.id) {
                gpu.numa_node = info.numa_node;
                gpu.cpu_socket = info.cpu_socket;
                gpu.nvlink_group = info.nvlink_group.clone();
                applied += 1;
            }
        }

        debug!(
            "Applied topology overlay to {}/{} GPUs of '{}'",
            applied,
            patched.gpus.len(),
            patched.name
        );
        patched
    }
}

impl FromIterator<(GpuId, TopologyInfo)> for TopologyOverlay {
    fn from_iter<I: IntoIterator<Item = (GpuId, TopologyInfo)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
