//! NUMA node → CPU set parsing
//!
//! Accepts `numactl --hardware` output, JSON in a few shapes, or a delimited
//! table with node and CPU-list columns. Nothing here is fatal: input with no
//! recognisable structure produces an empty map.

use crate::coerce::{json_token, to_index};
use crate::fields::{pick_json, Field, Row, RowContext};
use crate::strategy::FirstMatch;
use crate::tabular::read_headered;
use lens_core::NodeCpuMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Largest CPU id accepted from a list. Anything above is treated as garbage.
pub const MAX_CPU_ID: u32 = 65_535;

static NUMACTL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*node\s+(\d+)\s+cpus:\s*(.*)$").expect("static pattern compiles")
});

/// Parse a CPU list such as `"0-3,8,10-11"` or `"0 1 2 3"`.
///
/// Tokens are separated by commas or whitespace. Inclusive ranges are
/// expanded; tokens that do not parse, reversed ranges and ids above
/// [`MAX_CPU_ID`] are skipped.
pub fn parse_cpu_list(text: &str) -> BTreeSet<u32> {
    let mut cpus = BTreeSet::new();
    for token in text.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>())
                else {
                    continue;
                };
                if start > end || end > MAX_CPU_ID {
                    continue;
                }
                cpus.extend(start..=end);
            }
            None => {
                if let Ok(cpu) = token.parse::<u32>() {
                    if cpu <= MAX_CPU_ID {
                        cpus.insert(cpu);
                    }
                }
            }
        }
    }
    cpus
}

/// Parse NUMA affinity from any supported format.
///
/// Order: JSON, then a headered delimited table (only when the text contains a
/// comma), then `node <N> cpus: ...` lines. The first format that yields at
/// least one node with CPUs wins.
pub fn parse_affinity(text: &str) -> NodeCpuMap {
    let text = text.trim();
    if text.is_empty() {
        return NodeCpuMap::new();
    }

    FirstMatch::new("affinity")
        .then("json", parse_json)
        .then("delimited", parse_delimited)
        .then("numactl", |text| non_empty(parse_numactl(text)))
        .run(text)
        .map(|(_, map)| map)
        .unwrap_or_default()
}

/// Parse `numactl --hardware` style lines
pub fn parse_numactl(text: &str) -> NodeCpuMap {
    let mut nodes = NodeCpuMap::new();
    for line in text.lines() {
        let Some(caps) = NUMACTL_LINE.captures(line) else {
            continue;
        };
        let Ok(node) = caps[1].parse::<u32>() else {
            continue;
        };
        let cpus = parse_cpu_list(&caps[2]);
        if !cpus.is_empty() {
            nodes.insert(node, cpus);
        }
    }
    nodes
}

fn parse_json(text: &str) -> Option<NodeCpuMap> {
    let value: Value = serde_json::from_str(text).ok()?;

    let mut nodes = NodeCpuMap::new();
    match &value {
        Value::Object(object) => match object.get("nodes") {
            Some(Value::Array(rows)) => collect_json_rows(rows, &mut nodes),
            _ => {
                // Flat object: node id → CPU list
                for (node, cpus) in object {
                    let mut row = Map::new();
                    row.insert("node_id".to_string(), Value::String(node.clone()));
                    row.insert("cpus".to_string(), cpus.clone());
                    insert_json_row(&row, &mut nodes);
                }
            }
        },
        Value::Array(rows) => collect_json_rows(rows, &mut nodes),
        _ => {}
    }
    non_empty(nodes)
}

fn collect_json_rows(rows: &[Value], nodes: &mut NodeCpuMap) {
    for row in rows.iter().filter_map(Value::as_object) {
        insert_json_row(row, nodes);
    }
}

fn insert_json_row(row: &Map<String, Value>, nodes: &mut NodeCpuMap) {
    let Some(node) = pick_json(Field::AffinityNode, row).and_then(|v| to_index(&json_token(v)))
    else {
        return;
    };
    let cpus = match pick_json(Field::AffinityCpus, row) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| to_index(&json_token(item)))
            .filter(|cpu| *cpu <= MAX_CPU_ID)
            .collect(),
        Some(other) => parse_cpu_list(&json_token(other)),
        None => BTreeSet::new(),
    };
    if !cpus.is_empty() {
        nodes.insert(node, cpus);
    }
}

fn parse_delimited(text: &str) -> Option<NodeCpuMap> {
    if !text.contains(',') {
        return None;
    }
    let rows = match read_headered(text, b',') {
        Ok(rows) => rows,
        Err(e) => {
            debug!("Affinity text is not a readable table: {}", e);
            return None;
        }
    };

    let mut nodes = NodeCpuMap::new();
    for row in &rows {
        insert_table_row(row, &mut nodes);
    }
    non_empty(nodes)
}

fn insert_table_row(row: &Row, nodes: &mut NodeCpuMap) {
    let ctx = RowContext::default();
    let Some(node) = Field::AffinityNode.resolve_index(row, &ctx) else {
        return;
    };
    let cpus = Field::AffinityCpus
        .resolve_label(row, &ctx)
        .map(|list| parse_cpu_list(&list))
        .unwrap_or_default();
    if !cpus.is_empty() {
        nodes.insert(node, cpus);
    }
}

fn non_empty(nodes: NodeCpuMap) -> Option<NodeCpuMap> {
    (!nodes.is_empty()).then_some(nodes)
}
