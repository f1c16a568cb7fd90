//! GPU topology parsing
//!
//! The usual input is `nvidia-smi topo -m` output: a GPU×GPU relationship
//! matrix followed by `CPU Affinity` and `NUMA Affinity` columns. NVLink cells
//! become edges and the connected components become NVLink groups. Hosts that
//! already know the topology can instead send per-GPU rows as JSON or a
//! delimited table, which skips the matrix path entirely.

use crate::affinity::parse_cpu_list;
use crate::fields::{row_from_json, Field, Row, RowContext};
use crate::strategy::FirstMatch;
use crate::tabular::read_headered;
use crate::union_find::DisjointSet;
use lens_core::{GpuId, NodeCpuMap, TopologyInfo, TopologyOverlay};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

static COLUMN_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\t\s*|\s{2,}").expect("static pattern compiles"));

static GPU_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^GPU(\d+)$").expect("static pattern compiles"));

const GROUP_LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Label for the `index`-th connected component: `A` through `Z`, then
/// `G27`, `G28`, ...
pub fn group_label(index: usize) -> String {
    match GROUP_LETTERS.get(index) {
        Some(letter) => char::from(*letter).to_string(),
        None => format!("G{}", index + 1),
    }
}

/// Parse topology from any supported format.
///
/// Pre-structured JSON or delimited rows win when they yield at least one GPU;
/// otherwise the text is read as a relationship matrix. Unrecognised input
/// gives an empty overlay.
pub fn parse_topology(text: &str, nodes: &NodeCpuMap) -> TopologyOverlay {
    let text = text.trim();
    if text.is_empty() {
        return TopologyOverlay::new();
    }

    FirstMatch::new("topology")
        .then("json", parse_structured_json)
        .then("delimited", parse_structured_delimited)
        .then("matrix", |text| non_empty(parse_topology_matrix(text, nodes)))
        .run(text)
        .map(|(_, overlay)| overlay)
        .unwrap_or_default()
}

/// The NUMA node whose CPUs overlap most with `cpu_affinity`.
///
/// Ties go to the lowest node id. Returns `None` when the affinity string
/// names no CPUs or the map is empty.
pub fn resolve_cpu_socket(cpu_affinity: &str, nodes: &NodeCpuMap) -> Option<u32> {
    let cpus = parse_cpu_list(cpu_affinity);
    if cpus.is_empty() || nodes.is_empty() {
        return None;
    }

    let mut best: Option<(u32, usize)> = None;
    for (node, node_cpus) in nodes {
        let overlap = cpus.intersection(node_cpus).count();
        if best.map_or(true, |(_, best_overlap)| overlap > best_overlap) {
            best = Some((*node, overlap));
        }
    }
    best.map(|(node, _)| node)
}

/// Header layout of a relationship matrix
#[derive(Debug)]
struct MatrixHeader {
    /// `(cell position, GPU id)` for every `GPU<N>` column
    gpu_columns: Vec<(usize, GpuId)>,
    cpu_affinity_column: usize,
    numa_affinity_column: usize,
}

impl MatrixHeader {
    fn parse(line: &str) -> Option<Self> {
        let cells = split_cells(line);
        let gpu_columns: Vec<(usize, GpuId)> = cells
            .iter()
            .enumerate()
            .filter_map(|(pos, cell)| gpu_label_id(cell).map(|id| (pos, id)))
            .collect();
        if gpu_columns.is_empty() {
            return None;
        }

        let find = |name: &str| cells.iter().position(|cell| cell.eq_ignore_ascii_case(name));
        // Without separate columns the affinity values follow the GPU columns
        let after_gpus = gpu_columns.last().map_or(0, |(pos, _)| pos + 1);
        let cpu_affinity_column = find("CPU Affinity").unwrap_or(after_gpus);
        let numa_affinity_column = find("NUMA Affinity").unwrap_or(cpu_affinity_column + 1);

        Some(Self {
            gpu_columns,
            cpu_affinity_column,
            numa_affinity_column,
        })
    }
}

/// One parsed `GPU<N>` row of the matrix
#[derive(Debug)]
struct MatrixRow {
    gpu: GpuId,
    info: TopologyInfo,
    nvlink_peers: Vec<GpuId>,
}

/// Parse `nvidia-smi topo -m` style text.
///
/// Returns an empty overlay when no header line (one containing both
/// `CPU Affinity` and `GPU`) with `GPU<N>` labels is found.
pub fn parse_topology_matrix(text: &str, nodes: &NodeCpuMap) -> TopologyOverlay {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let Some(header) = lines
        .by_ref()
        .find(|line| line.contains("CPU Affinity") && line.contains("GPU"))
        .and_then(MatrixHeader::parse)
    else {
        debug!("No topology matrix header found");
        return TopologyOverlay::new();
    };

    let mut rows: Vec<MatrixRow> = Vec::new();
    for line in lines {
        let Some(row) = parse_matrix_row(line, &header, nodes) else {
            continue;
        };
        if rows.iter().any(|seen| seen.gpu == row.gpu) {
            warn!("Ignoring repeated topology row for GPU{}", row.gpu);
            continue;
        }
        rows.push(row);
    }

    let groups = nvlink_groups(&rows);
    rows.into_iter()
        .map(|mut row| {
            if let Some(group) = groups.get(&row.gpu) {
                row.info.nvlink_group = group.clone();
            }
            (row.gpu, row.info)
        })
        .collect()
}

fn parse_matrix_row(line: &str, header: &MatrixHeader, nodes: &NodeCpuMap) -> Option<MatrixRow> {
    let cells = split_cells(line);
    let gpu = gpu_label_id(cells.first()?)?;
    if cells.len() < header.gpu_columns.len() + 1 {
        return None;
    }

    // Row cells are shifted one to the right of the header by the row label
    let cell = |header_pos: usize| cells.get(header_pos + 1).map(String::as_str).unwrap_or("");

    let nvlink_peers = header
        .gpu_columns
        .iter()
        .filter(|(pos, peer)| *peer != gpu && cell(*pos).to_ascii_uppercase().starts_with("NV"))
        .map(|(_, peer)| *peer)
        .collect();

    let cpu_affinity = cell(header.cpu_affinity_column);
    let numa_cell = cell(header.numa_affinity_column);
    let numa_node = if !numa_cell.is_empty() && numa_cell.bytes().all(|b| b.is_ascii_digit()) {
        numa_cell.parse::<u32>().unwrap_or(gpu % 2)
    } else {
        gpu % 2
    };
    let cpu_socket = resolve_cpu_socket(cpu_affinity, nodes).unwrap_or(numa_node);

    let mut info = TopologyInfo::new(numa_node, cpu_socket, "A");
    if !cpu_affinity.is_empty() {
        info = info.with_cpu_affinity(cpu_affinity);
    }

    Some(MatrixRow {
        gpu,
        info,
        nvlink_peers,
    })
}

/// Connected components of the NVLink graph over the GPUs that have rows,
/// labelled in order of each component's smallest GPU id.
fn nvlink_groups(rows: &[MatrixRow]) -> BTreeMap<GpuId, String> {
    let index: BTreeMap<GpuId, usize> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| (row.gpu, idx))
        .collect();

    let mut sets = DisjointSet::new(rows.len());
    for (a, row) in rows.iter().enumerate() {
        for peer in &row.nvlink_peers {
            if let Some(&b) = index.get(peer) {
                sets.union(a, b);
            }
        }
    }

    let mut components: Vec<Vec<GpuId>> = sets
        .components()
        .into_iter()
        .map(|members| {
            let mut ids: Vec<GpuId> = members.into_iter().map(|idx| rows[idx].gpu).collect();
            ids.sort_unstable();
            ids
        })
        .collect();
    components.sort_by_key(|ids| ids[0]);

    debug!(
        "Derived {} NVLink groups from {} GPUs",
        components.len(),
        rows.len()
    );

    let mut groups = BTreeMap::new();
    for (idx, ids) in components.iter().enumerate() {
        let label = group_label(idx);
        for id in ids {
            groups.insert(*id, label.clone());
        }
    }
    groups
}

fn split_cells(line: &str) -> Vec<String> {
    COLUMN_SPLIT
        .split(line.trim())
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn gpu_label_id(cell: &str) -> Option<GpuId> {
    GPU_LABEL.captures(cell)?[1].parse().ok()
}

fn parse_structured_json(text: &str) -> Option<TopologyOverlay> {
    let value: Value = serde_json::from_str(text).ok()?;
    let rows = match &value {
        Value::Object(object) => object.get("gpus")?.as_array()?,
        Value::Array(rows) => rows,
        _ => return None,
    };

    let overlay: TopologyOverlay = rows
        .iter()
        .filter_map(Value::as_object)
        .map(row_from_json)
        .filter_map(|row| structured_info(&row))
        .collect();
    non_empty(overlay)
}

fn parse_structured_delimited(text: &str) -> Option<TopologyOverlay> {
    if !text.contains(',') {
        return None;
    }
    let rows = read_headered(text, b',').ok()?;
    let overlay: TopologyOverlay = rows.iter().filter_map(structured_info).collect();
    non_empty(overlay)
}

/// Topology facts from one pre-structured row; rows without a GPU id are
/// skipped.
fn structured_info(row: &Row) -> Option<(GpuId, TopologyInfo)> {
    let mut ctx = RowContext::default();
    ctx.id = Field::TopologyGpuId.resolve_index(row, &ctx)?;
    ctx.numa_node = Field::TopologyNumaNode.resolve_index(row, &ctx)?;
    let cpu_socket = Field::TopologyCpuSocket.resolve_index(row, &ctx)?;
    let nvlink_group = Field::TopologyGroup.resolve_label(row, &ctx)?;

    let mut info = TopologyInfo::new(ctx.numa_node, cpu_socket, nvlink_group);
    if let Some(affinity) = Field::CpuAffinity.resolve_label(row, &ctx) {
        info = info.with_cpu_affinity(affinity);
    }
    Some((ctx.id, info))
}

fn non_empty(overlay: TopologyOverlay) -> Option<TopologyOverlay> {
    (!overlay.is_empty()).then_some(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const TOPO_4GPU: &str = "\tGPU0\tGPU1\tGPU2\tGPU3\tCPU Affinity\tNUMA Affinity\tGPU NUMA ID\n\
GPU0\t X \tNV12\tSYS\tSYS\t0-23,48-71\t0\t\tN/A\n\
GPU1\tNV12\t X \tSYS\tSYS\t0-23,48-71\t0\t\tN/A\n\
GPU2\tSYS\tSYS\t X \tNV12\t24-47,72-95\t1\t\tN/A\n\
GPU3\tSYS\tSYS\tNV12\t X \t24-47,72-95\t1\t\tN/A\n\
\n\
Legend:\n\
\n\
  X    = Self\n\
  SYS  = Connection traversing PCIe as well as the SMP interconnect between NUMA nodes (e.g., QPI/UPI)\n\
  NV#  = Connection traversing a bonded set of # NVLinks\n";

    fn two_socket_nodes() -> NodeCpuMap {
        let mut nodes = NodeCpuMap::new();
        nodes.insert(0, (0..24).chain(48..72).collect());
        nodes.insert(1, (24..48).chain(72..96).collect());
        nodes
    }

    fn groups(overlay: &TopologyOverlay) -> Vec<(GpuId, String)> {
        overlay
            .iter()
            .map(|(id, info)| (id, info.nvlink_group.clone()))
            .collect()
    }

    #[test]
    fn test_group_labels() {
        assert_eq!(group_label(0), "A");
        assert_eq!(group_label(25), "Z");
        assert_eq!(group_label(26), "G27");
        assert_eq!(group_label(30), "G31");
    }

    #[test]
    fn test_nvidia_smi_matrix() {
        let overlay = parse_topology(TOPO_4GPU, &two_socket_nodes());
        assert_eq!(overlay.len(), 4);
        assert_eq!(
            groups(&overlay),
            vec![
                (0, "A".to_string()),
                (1, "A".to_string()),
                (2, "B".to_string()),
                (3, "B".to_string())
            ]
        );

        let gpu2 = overlay.get(2).unwrap();
        assert_eq!(gpu2.numa_node, 1);
        assert_eq!(gpu2.cpu_socket, 1);
        assert_eq!(gpu2.cpu_affinity.as_deref(), Some("24-47,72-95"));
        assert_eq!(overlay.get(0).unwrap().cpu_socket, 0);
    }

    #[test]
    fn test_socket_falls_back_to_numa_without_affinity_map() {
        let overlay = parse_topology(TOPO_4GPU, &NodeCpuMap::new());
        assert_eq!(overlay.get(3).map(|i| (i.numa_node, i.cpu_socket)), Some((1, 1)));
    }

    #[test]
    fn test_space_separated_matrix_and_numa_fallback() {
        let text = "        GPU0    GPU1    GPU2    CPU Affinity    NUMA Affinity\n\
                    GPU0     X      nv4     PHB     0-7             N/A\n\
                    GPU1    NV4      X      PHB     0-7             N/A\n\
                    GPU2    PHB     PHB      X      8-15            N/A\n";
        let overlay = parse_topology_matrix(text, &NodeCpuMap::new());
        assert_eq!(overlay.len(), 3);
        // Non-integer NUMA affinity falls back to GPU id parity
        assert_eq!(overlay.get(1).unwrap().numa_node, 1);
        assert_eq!(overlay.get(2).unwrap().numa_node, 0);
        assert_eq!(
            groups(&overlay),
            vec![
                (0, "A".to_string()),
                (1, "A".to_string()),
                (2, "B".to_string())
            ]
        );
    }

    #[test]
    fn test_groups_ordered_by_smallest_gpu_id() {
        // GPU3 and GPU0 are linked; rows are declared out of order
        let text = "\tGPU0\tGPU1\tGPU2\tGPU3\tCPU Affinity\tNUMA Affinity\n\
GPU2\tSYS\tSYS\tX\tSYS\t0-3\t0\n\
GPU3\tNV2\tSYS\tSYS\tX\t0-3\t0\n\
GPU1\tSYS\tX\tSYS\tSYS\t0-3\t0\n\
GPU0\tX\tSYS\tSYS\tNV2\t0-3\t0\n";
        let overlay = parse_topology_matrix(text, &NodeCpuMap::new());
        assert_eq!(
            groups(&overlay),
            vec![
                (0, "A".to_string()),
                (1, "B".to_string()),
                (2, "C".to_string()),
                (3, "A".to_string())
            ]
        );
    }

    #[test]
    fn test_edges_to_gpus_without_rows_are_ignored() {
        let text = "\tGPU0\tGPU1\tCPU Affinity\tNUMA Affinity\n\
GPU0\tX\tNV1\t0-3\t0\n\
junk line\n\
GPU1\tshort\n";
        let overlay = parse_topology_matrix(text, &NodeCpuMap::new());
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.get(0).unwrap().nvlink_group, "A");
    }

    #[test]
    fn test_socket_best_overlap_and_ties() {
        let mut nodes = NodeCpuMap::new();
        nodes.insert(0, [0, 1].into_iter().collect::<BTreeSet<u32>>());
        nodes.insert(1, [2, 3, 4].into_iter().collect());
        nodes.insert(2, [5, 6, 7].into_iter().collect());

        assert_eq!(resolve_cpu_socket("2-5", &nodes), Some(1));
        assert_eq!(resolve_cpu_socket("3-6", &nodes), Some(1));
        assert_eq!(resolve_cpu_socket("100", &nodes), Some(0));
        assert_eq!(resolve_cpu_socket("N/A", &nodes), None);
        assert_eq!(resolve_cpu_socket("0-3", &NodeCpuMap::new()), None);
    }

    #[test]
    fn test_no_header_is_empty() {
        assert!(parse_topology("GPU0 X NV1\nGPU1 NV1 X\n", &NodeCpuMap::new()).is_empty());
        assert!(parse_topology("", &NodeCpuMap::new()).is_empty());
        // Only `GPU NUMA ID`: no real GPU columns
        assert!(parse_topology_matrix("CPU Affinity    GPU NUMA ID\n", &NodeCpuMap::new()).is_empty());
    }

    #[test]
    fn test_structured_json_short_circuits_matrix() {
        let text = r#"{"gpus": [
            {"gpu_id": 0, "numa_node": 1, "cpu_socket": 0, "nvlink_group": "X", "cpu_affinity": "0-7"},
            {"index": 1},
            {"numa_node": 0}
        ]}"#;
        let overlay = parse_topology(text, &two_socket_nodes());
        assert_eq!(overlay.len(), 2);

        let gpu0 = overlay.get(0).unwrap();
        assert_eq!((gpu0.numa_node, gpu0.cpu_socket), (1, 0));
        assert_eq!(gpu0.nvlink_group, "X");
        assert_eq!(gpu0.cpu_affinity.as_deref(), Some("0-7"));

        let gpu1 = overlay.get(1).unwrap();
        assert_eq!((gpu1.numa_node, gpu1.cpu_socket), (1, 1));
        assert_eq!(gpu1.nvlink_group, "A");
        assert_eq!(gpu1.cpu_affinity, None);
    }

    #[test]
    fn test_structured_delimited() {
        let text = "gpu_id,numa_affinity,socket,group\n0,0,0,A\n1,1,,B\n";
        let overlay = parse_topology(text, &NodeCpuMap::new());
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.get(1), Some(&TopologyInfo::new(1, 1, "B")));
    }

    #[test]
    fn test_structured_rows_use_field_fallbacks() {
        let text = "gpu_id,group,cpu_affinity\n2, nv0 ,\n3,,0-3\n,B,4-7\n";
        let overlay = parse_topology(text, &NodeCpuMap::new());
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.get(2), Some(&TopologyInfo::new(0, 0, "nv0")));
        assert_eq!(
            overlay.get(3),
            Some(&TopologyInfo::new(1, 1, "A").with_cpu_affinity("0-3"))
        );
    }

    #[test]
    fn test_matrix_with_commas_is_not_mistaken_for_a_table() {
        // CPU affinity cells contain commas, so the delimited strategy runs
        // first and must find no GPU id column.
        let overlay = parse_topology(TOPO_4GPU, &NodeCpuMap::new());
        assert_eq!(overlay.len(), 4);
        assert_eq!(overlay.get(0).unwrap().nvlink_group, "A");
    }
}
