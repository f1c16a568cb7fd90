//! Bundled sample fleets
//!
//! Two reference servers that hosts can score without any upload.

use crate::types::{GpuRecord, Scenario};
use std::collections::BTreeMap;

/// (id, util, vram_used_gb, network_io_score, numa_node, cpu_socket, group)
type GpuRow = (u32, f64, f64, f64, u32, u32, &'static str);

const H200_8GPU: [GpuRow; 8] = [
    (0, 92.0, 132.0, 0.71, 0, 0, "A"),
    (1, 90.0, 128.0, 0.69, 0, 0, "A"),
    (2, 88.0, 124.0, 0.65, 0, 1, "A"),
    (3, 84.0, 118.0, 0.66, 0, 1, "A"),
    (4, 78.0, 110.0, 0.64, 1, 1, "B"),
    (5, 72.0, 100.0, 0.60, 1, 0, "B"),
    (6, 66.0, 90.0, 0.63, 1, 1, "B"),
    (7, 58.0, 78.0, 0.63, 1, 1, "B"),
];

const L40S_4GPU: [GpuRow; 4] = [
    (0, 74.0, 31.0, 0.70, 0, 0, "A"),
    (1, 68.0, 28.0, 0.66, 0, 0, "A"),
    (2, 43.0, 15.0, 0.52, 1, 1, "B"),
    (3, 36.0, 12.0, 0.47, 1, 1, "B"),
];

fn build(name: &str, total_vram_gb: u32, rows: &[GpuRow]) -> Scenario {
    let gpus = rows
        .iter()
        .map(|&(id, util, used, net, numa, socket, group)| {
            GpuRecord::new(id)
                .with_util(util)
                .with_vram_used_gb(used)
                .with_network_io_score(net)
                .with_placement(numa, socket)
                .with_nvlink_group(group)
        })
        .collect();
    Scenario::new(name, total_vram_gb, gpus)
}

/// 8× H200 (141 GB) server with two NVLink islands
pub fn h200_8gpu() -> Scenario {
    build("H200 8-GPU Server", 141, &H200_8GPU)
}

/// 4× L40S (48 GB) PCIe server
pub fn l40s_4gpu() -> Scenario {
    build("L40s 4-GPU Server", 48, &L40S_4GPU)
}

/// All sample scenarios keyed by display name
pub fn sample_scenarios() -> BTreeMap<String, Scenario> {
    [h200_8gpu(), l40s_4gpu()]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect()
}
