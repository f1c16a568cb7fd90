//! Scenario construction from extracted rows
//!
//! Rows from either the delimited or the JSON path arrive as canonical-key
//! maps. Every target field resolves through [`Field`]'s synonym table; any
//! field that cannot be resolved takes its documented fallback, so a row never
//! fails on its own. Only an empty row set is an error.

use crate::coerce::round2;
use crate::fields::{Fallback, Field, Row, RowContext};
use crate::Result;
use lens_core::{GpuRecord, IngestConfig, ParseError, Scenario};
use std::collections::BTreeSet;
use tracing::{debug, warn};

const MIB_PER_GB: f64 = 1024.0;

/// Builds [`Scenario`]s from extracted rows
#[derive(Debug, Clone)]
pub struct ScenarioBuilder<'a> {
    config: &'a IngestConfig,
}

impl<'a> ScenarioBuilder<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    /// Build a scenario named `name` from `rows`.
    ///
    /// GPU ids must be unique, so a row repeating an earlier id is dropped.
    pub fn build(&self, name: &str, rows: &[Row]) -> Result<Scenario> {
        if rows.is_empty() {
            return Err(ParseError::NoGpuRows);
        }

        let mut seen = BTreeSet::new();
        let mut gpus = Vec::with_capacity(rows.len());
        let mut max_total_gb = f64::MIN;

        for (position, row) in rows.iter().enumerate() {
            let (gpu, total_gb) = self.build_record(row, position, rows.len());
            if !seen.insert(gpu.id) {
                warn!("Dropping row {} of '{}': duplicate GPU id {}", position, name, gpu.id);
                continue;
            }
            max_total_gb = max_total_gb.max(total_gb);
            gpus.push(gpu);
        }

        let total_vram_gb = if max_total_gb.is_finite() {
            max_total_gb.ceil().clamp(1.0, u32::MAX as f64) as u32
        } else {
            1
        };

        debug!(
            "Built scenario '{}' with {} GPUs, total VRAM {} GB",
            name,
            gpus.len(),
            total_vram_gb
        );
        Ok(Scenario::new(name, total_vram_gb, gpus))
    }

    /// Resolve one row into a record and the row's total VRAM in GB
    fn build_record(&self, row: &Row, position: usize, row_count: usize) -> (GpuRecord, f64) {
        let mut ctx = RowContext {
            position,
            row_count,
            ..RowContext::default()
        };

        ctx.id = self.resolve_index(row, Field::GpuId, &ctx);

        let gpu_util = Field::GpuUtil
            .pick_f64(row)
            .unwrap_or_else(|| self.fallback_value(Field::GpuUtil, &ctx))
            .clamp(0.0, 100.0);
        ctx.gpu_util = gpu_util;

        let vram_used_gb = self
            .resolve_memory(row, Field::MemoryUsedGb, Field::MemoryUsedMib, &ctx)
            .max(0.0);
        let vram_total_gb = self.resolve_memory(row, Field::MemoryTotalGb, Field::MemoryTotalMib, &ctx);

        let network_io_score = match Field::NetworkIoScore.pick_f64(row) {
            Some(score) => score.clamp(0.0, 1.0),
            None => self.fallback_value(Field::NetworkIoScore, &ctx),
        };

        ctx.numa_node = self.resolve_index(row, Field::NumaNode, &ctx);
        let cpu_socket = self.resolve_index(row, Field::CpuSocket, &ctx);

        let nvlink_group = self.resolve_group(row, &ctx);

        let record = GpuRecord {
            id: ctx.id,
            gpu_util: round2(gpu_util),
            vram_used_gb: round2(vram_used_gb),
            network_io_score: round2(network_io_score),
            numa_node: ctx.numa_node,
            cpu_socket,
            nvlink_group,
        };
        (record, vram_total_gb)
    }

    /// GB keys win over MiB keys. The MiB value, or its fallback, is
    /// converted, so the VRAM default is read in MiB too.
    fn resolve_memory(&self, row: &Row, gb: Field, mib: Field, ctx: &RowContext) -> f64 {
        if let Some(value) = gb.pick_f64(row) {
            return value;
        }
        match gb.fallback() {
            Fallback::OtherUnit => {
                let value = mib
                    .pick_f64(row)
                    .unwrap_or_else(|| self.fallback_value(mib, ctx));
                value / MIB_PER_GB
            }
            other => self.fallback_value_of(other, ctx),
        }
    }

    fn resolve_index(&self, row: &Row, field: Field, ctx: &RowContext) -> u32 {
        field.resolve_index(row, ctx).unwrap_or(0)
    }

    /// NVLink group: explicit value, else `A` when an NVLink key is present
    /// but blank, else the field's fallback (bisection by id).
    fn resolve_group(&self, row: &Row, ctx: &RowContext) -> String {
        if let Some(group) = Field::NvlinkGroup.pick(row) {
            return group.trim().to_string();
        }
        let fallback = if Field::NvlinkGroup.is_present(row) {
            Fallback::GroupA
        } else {
            Field::NvlinkGroup.fallback()
        };
        fallback.label(ctx).unwrap_or_else(|| "A".to_string())
    }

    fn fallback_value(&self, field: Field, ctx: &RowContext) -> f64 {
        self.fallback_value_of(field.fallback(), ctx)
    }

    fn fallback_value_of(&self, fallback: Fallback, ctx: &RowContext) -> f64 {
        match fallback {
            Fallback::DefaultVramTotal => self.config.default_vram_total_mib,
            Fallback::UtilizationProxy => self.config.synthesize_network_score(ctx.gpu_util),
            other => other.index(ctx).map_or(0.0, f64::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn build(rows: &[Row]) -> Scenario {
        let config = IngestConfig::default();
        ScenarioBuilder::new(&config).build("test", rows).unwrap()
    }

    #[test]
    fn test_no_rows() {
        let config = IngestConfig::default();
        let err = ScenarioBuilder::new(&config).build("empty", &[]).unwrap_err();
        assert!(matches!(err, ParseError::NoGpuRows));
    }

    #[test]
    fn test_mib_conversion() {
        let scenario = build(&[row(&[
            ("index", "0"),
            ("memory_used_mib", "102400"),
            ("memory_total_mib", "163840"),
        ])]);
        assert_eq!(scenario.gpus[0].vram_used_gb, 100.0);
        assert!(scenario.total_vram_gb as f64 >= 160.0);
        assert_eq!(scenario.total_vram_gb, 160);
    }

    #[test]
    fn test_gb_keys_take_precedence() {
        let scenario = build(&[row(&[
            ("memory_used", "2048"),
            ("vram_used_gb", "7.5"),
            ("memory_total", "4096"),
            ("vram_total_gb", "140.4"),
        ])]);
        assert_eq!(scenario.gpus[0].vram_used_gb, 7.5);
        assert_eq!(scenario.total_vram_gb, 141);
    }

    #[test]
    fn test_missing_total_defaults_to_80_mib() {
        // 80 MiB is well under 1 GB, so the scenario total rounds up to 1
        let scenario = build(&[row(&[("index", "0"), ("utilization_gpu", "10")])]);
        assert_eq!(scenario.total_vram_gb, 1);
        assert_eq!(scenario.gpus[0].vram_used_gb, 0.0);
    }

    #[test]
    fn test_network_score_proxy() {
        let scenario = build(&[
            row(&[("gpu_util", "50")]),
            row(&[("gpu_util", "0")]),
            row(&[("gpu_util", "80"), ("network_score", "0.31")]),
            row(&[("gpu_util", "80"), ("network_io_score", "7")]),
        ]);
        assert_eq!(scenario.gpus[0].network_io_score, 0.6);
        assert_eq!(scenario.gpus[1].network_io_score, 0.2);
        assert_eq!(scenario.gpus[2].network_io_score, 0.31);
        assert_eq!(scenario.gpus[3].network_io_score, 1.0);
    }

    #[test]
    fn test_id_falls_back_to_position() {
        let scenario = build(&[
            row(&[("index", "n/a")]),
            row(&[("gpu", "")]),
            row(&[("id", "-4")]),
        ]);
        let ids: Vec<u32> = scenario.gpus.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_numa_and_socket_defaults() {
        let scenario = build(&[
            row(&[("index", "0")]),
            row(&[("index", "1")]),
            row(&[("index", "2"), ("numa", "1")]),
            row(&[("index", "3"), ("numa_node", "0"), ("socket", "1")]),
        ]);
        let placement: Vec<(u32, u32)> = scenario
            .gpus
            .iter()
            .map(|g| (g.numa_node, g.cpu_socket))
            .collect();
        assert_eq!(placement, vec![(0, 0), (1, 1), (1, 1), (0, 1)]);
    }

    #[test]
    fn test_nvlink_bisection_without_key() {
        let rows: Vec<Row> = (0..4)
            .map(|i| row(&[("index", i.to_string().as_str())]))
            .collect();
        let scenario = build(&rows);
        let groups: Vec<&str> = scenario.gpus.iter().map(|g| g.nvlink_group.as_str()).collect();
        assert_eq!(groups, vec!["A", "A", "B", "B"]);
    }

    #[test]
    fn test_nvlink_blank_value_defaults_to_a_without_bisection() {
        let rows: Vec<Row> = (0..4)
            .map(|i| row(&[("index", i.to_string().as_str()), ("nvlink_group", "")]))
            .collect();
        let scenario = build(&rows);
        assert!(scenario.gpus.iter().all(|g| g.nvlink_group == "A"));
    }

    #[test]
    fn test_blank_topology_group_still_bisects() {
        let rows: Vec<Row> = (0..4)
            .map(|i| row(&[("index", i.to_string().as_str()), ("topology_group", "")]))
            .collect();
        let scenario = build(&rows);
        let groups: Vec<&str> = scenario.gpus.iter().map(|g| g.nvlink_group.as_str()).collect();
        assert_eq!(groups, vec!["A", "A", "B", "B"]);
    }

    #[test]
    fn test_nvlink_explicit_value() {
        let scenario = build(&[
            row(&[("index", "0"), ("topology_group", "nv0")]),
            row(&[("index", "1"), ("nvlink", " C ")]),
        ]);
        assert_eq!(scenario.gpus[0].nvlink_group, "nv0");
        assert_eq!(scenario.gpus[1].nvlink_group, "C");
    }

    #[test]
    fn test_util_is_clamped_and_rounded() {
        let scenario = build(&[
            row(&[("util", "133.3")]),
            row(&[("util", "-5")]),
            row(&[("util", "45.678")]),
        ]);
        assert_eq!(scenario.gpus[0].gpu_util, 100.0);
        assert_eq!(scenario.gpus[1].gpu_util, 0.0);
        assert_eq!(scenario.gpus[2].gpu_util, 45.68);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let scenario = build(&[
            row(&[("index", "0"), ("util", "10")]),
            row(&[("index", "0"), ("util", "90"), ("vram_total_gb", "500")]),
            row(&[("index", "1"), ("util", "20")]),
        ]);
        assert_eq!(scenario.len(), 2);
        assert_eq!(scenario.gpu(0).map(|g| g.gpu_util), Some(10.0));
        assert_eq!(scenario.total_vram_gb, 1);
    }

    #[test]
    fn test_custom_defaults() {
        let config = IngestConfig::default()
            .with_default_vram_total_mib(49152.0)
            .with_network_score_proxy(0.1, 0.5);
        let scenario = ScenarioBuilder::new(&config)
            .build("custom", &[row(&[("util", "100")])])
            .unwrap();
        assert_eq!(scenario.total_vram_gb, 48);
        assert_eq!(scenario.gpus[0].network_io_score, 0.6);
    }
}
