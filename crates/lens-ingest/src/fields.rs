//! Synonym table mapping canonical target fields to acceptable source keys
//!
//! Vendor tools name the same quantity a dozen ways. Each [`Field`] lists the
//! canonicalized source keys it accepts, in priority order, together with the
//! [`Fallback`] used when none of them holds a usable value.

use crate::coerce::{canonicalize_column, json_token, to_float, to_index};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One extracted row: canonical column name → raw token. Blank tokens count as
/// missing values.
pub type Row = BTreeMap<String, String>;

/// Build a row from a JSON object, canonicalizing keys the way CSV headers are.
/// The first occurrence of a canonical key wins.
pub fn row_from_json(object: &Map<String, Value>) -> Row {
    let mut row = Row::new();
    for (key, value) in object {
        row.entry(canonicalize_column(key))
            .or_insert_with(|| json_token(value));
    }
    row
}

/// Canonical target fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    // GPU telemetry rows
    GpuId,
    GpuUtil,
    MemoryUsedMib,
    MemoryTotalMib,
    MemoryUsedGb,
    MemoryTotalGb,
    NetworkIoScore,
    NumaNode,
    CpuSocket,
    NvlinkGroup,

    // Affinity rows
    AffinityNode,
    AffinityCpus,

    // Pre-structured topology rows
    TopologyGpuId,
    TopologyNumaNode,
    TopologyCpuSocket,
    TopologyGroup,
    CpuAffinity,
}

/// Values already resolved for the current row that fallbacks may refer to
#[derive(Debug, Clone, Copy, Default)]
pub struct RowContext {
    pub position: usize,
    pub row_count: usize,
    pub id: u32,
    pub gpu_util: f64,
    pub numa_node: u32,
}

/// Value used when a field has no usable source key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Position of the row in the input
    RowPosition,
    /// Literal zero
    Zero,
    /// Resolve through the other unit (GB ↔ MiB) before defaulting
    OtherUnit,
    /// Configured per-GPU VRAM total
    DefaultVramTotal,
    /// Synthesized from utilization
    UtilizationProxy,
    /// GPU id modulo 2
    IdParity,
    /// Same value as the resolved NUMA node
    NumaNode,
    /// Bisect by id when no NVLink key exists at all, otherwise group `A`
    BisectOrA,
    /// Group `A`
    GroupA,
    /// Row is unusable without this field
    SkipRow,
    /// Field is optional
    Absent,
}

impl Fallback {
    /// Integer value of the fallback for the current row.
    ///
    /// `None` for fallbacks that are not row-derived integers: those that
    /// need ingestion config, produce a label, or mean "no value".
    pub fn index(self, ctx: &RowContext) -> Option<u32> {
        match self {
            Fallback::RowPosition => Some(ctx.position.min(u32::MAX as usize) as u32),
            Fallback::Zero => Some(0),
            Fallback::IdParity => Some(ctx.id % 2),
            Fallback::NumaNode => Some(ctx.numa_node),
            Fallback::OtherUnit
            | Fallback::DefaultVramTotal
            | Fallback::UtilizationProxy
            | Fallback::BisectOrA
            | Fallback::GroupA
            | Fallback::SkipRow
            | Fallback::Absent => None,
        }
    }

    /// Group label of the fallback for the current row
    pub fn label(self, ctx: &RowContext) -> Option<String> {
        match self {
            Fallback::BisectOrA => {
                let half = (ctx.row_count / 2).max(1).min(u32::MAX as usize) as u32;
                let group = if ctx.id < half { "A" } else { "B" };
                Some(group.to_string())
            }
            Fallback::GroupA => Some("A".to_string()),
            Fallback::RowPosition
            | Fallback::Zero
            | Fallback::OtherUnit
            | Fallback::DefaultVramTotal
            | Fallback::UtilizationProxy
            | Fallback::IdParity
            | Fallback::NumaNode
            | Fallback::SkipRow
            | Fallback::Absent => None,
        }
    }
}

impl Field {
    /// Accepted source keys, highest priority first
    pub const fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::GpuId => &["index", "gpu", "gpu_id", "id"],
            Field::GpuUtil => &["utilization_gpu", "gpu_util", "gpu_utilization", "util"],
            Field::MemoryUsedMib => &[
                "memory_used",
                "memory_used_mib",
                "fb_memory_usage_used",
                "vram_used_mib",
            ],
            Field::MemoryTotalMib => &[
                "memory_total",
                "memory_total_mib",
                "fb_memory_usage_total",
                "vram_total_mib",
            ],
            Field::MemoryUsedGb => &["vram_used_gb", "memory_used_gb"],
            Field::MemoryTotalGb => &["vram_total_gb", "memory_total_gb"],
            Field::NetworkIoScore => &["network_io_score", "network_score"],
            Field::NumaNode => &["numa_node", "numa"],
            Field::CpuSocket => &["cpu_socket", "socket", "cpu_affinity_socket"],
            Field::NvlinkGroup => &["nvlink_group", "nvlink", "topology_group"],
            Field::AffinityNode => &["node_id", "node", "id"],
            Field::AffinityCpus => &["cpus", "cpu_list"],
            Field::TopologyGpuId => &["gpu_id", "index", "id"],
            Field::TopologyNumaNode => &["numa_node", "numa_affinity"],
            Field::TopologyCpuSocket => &["cpu_socket", "socket"],
            Field::TopologyGroup => &["nvlink_group", "group"],
            Field::CpuAffinity => &["cpu_affinity"],
        }
    }

    pub const fn fallback(self) -> Fallback {
        match self {
            Field::GpuId => Fallback::RowPosition,
            Field::GpuUtil => Fallback::Zero,
            Field::MemoryUsedMib => Fallback::Zero,
            Field::MemoryTotalMib => Fallback::DefaultVramTotal,
            Field::MemoryUsedGb | Field::MemoryTotalGb => Fallback::OtherUnit,
            Field::NetworkIoScore => Fallback::UtilizationProxy,
            Field::NumaNode | Field::TopologyNumaNode => Fallback::IdParity,
            Field::CpuSocket | Field::TopologyCpuSocket => Fallback::NumaNode,
            Field::NvlinkGroup => Fallback::BisectOrA,
            Field::TopologyGroup => Fallback::GroupA,
            Field::AffinityNode | Field::TopologyGpuId => Fallback::SkipRow,
            Field::AffinityCpus | Field::CpuAffinity => Fallback::Absent,
        }
    }

    /// First non-blank value among the field's source keys
    pub fn pick<'a>(self, row: &'a Row) -> Option<&'a str> {
        self.synonyms()
            .iter()
            .filter_map(|key| row.get(*key))
            .map(|value| value.as_str())
            .find(|value| !value.trim().is_empty())
    }

    /// First non-blank value, coerced to a float. An unparsable winner does
    /// not fall through to lower-priority keys.
    pub fn pick_f64(self, row: &Row) -> Option<f64> {
        self.pick(row).and_then(to_float)
    }

    /// First non-blank value, coerced to a non-negative integer
    pub fn pick_index(self, row: &Row) -> Option<u32> {
        self.pick(row).and_then(to_index)
    }

    /// Keys whose mere presence (blank or not) counts as the field being
    /// reported. For NVLink only the explicit `nvlink*` columns count;
    /// `topology_group` is read as a value but does not suppress bisection.
    pub const fn presence_keys(self) -> &'static [&'static str] {
        match self {
            Field::NvlinkGroup => &["nvlink_group", "nvlink"],
            other => other.synonyms(),
        }
    }

    /// Whether any presence key is in the row, blank or not
    pub fn is_present(self, row: &Row) -> bool {
        self.presence_keys().iter().any(|key| row.contains_key(*key))
    }

    /// Picked index, else the field's fallback. `None` means the row has no
    /// value for this field (for id fields: skip the row).
    pub fn resolve_index(self, row: &Row, ctx: &RowContext) -> Option<u32> {
        self.pick_index(row).or_else(|| self.fallback().index(ctx))
    }

    /// Picked text (trimmed), else the field's fallback label
    pub fn resolve_label(self, row: &Row, ctx: &RowContext) -> Option<String> {
        match self.pick(row) {
            Some(value) => Some(value.trim().to_string()),
            None => self.fallback().label(ctx),
        }
    }
}

/// Same lookup as [`Field::pick`], against a raw JSON object
pub fn pick_json<'a>(field: Field, object: &'a Map<String, Value>) -> Option<&'a Value> {
    field
        .synonyms()
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}
