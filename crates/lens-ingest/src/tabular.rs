//! Delimited-text row extraction with header detection
//!
//! Uploads may be `nvidia-smi --query-gpu ... --format=csv` output (with a
//! header), the same with `noheader`, or hand-made spreadsheets. The first row
//! decides which: if it looks like column names the file is parsed by header,
//! otherwise columns are named by position.

use crate::coerce::canonicalize_column;
use crate::fields::Row;
use crate::Result;
use lens_core::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static NUMBERISH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+\-]?\d+(\.\d+)?$").expect("static pattern compiles"));

static HEADERISH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z_.]").expect("static pattern compiles"));

/// Read delimited text into trimmed records, dropping rows whose cells are all
/// blank.
fn read_records(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::delimited(e.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        records.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }
    Ok(records)
}

/// Whether a row reads like column names: at least `max(2, cells / 2)`
/// non-blank cells contain a letter, underscore or dot and are not plain
/// numbers.
pub fn looks_like_header(cells: &[String]) -> bool {
    let headerish = cells
        .iter()
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .filter(|cell| HEADERISH.is_match(cell) && !NUMBERISH.is_match(cell))
        .count();

    headerish >= (cells.len() / 2).max(2)
}

/// Column names for a headerless upload with `count` columns
pub fn positional_columns(count: usize) -> Vec<String> {
    const BASE: [&str; 7] = [
        "index",
        "utilization_gpu",
        "memory_used",
        "memory_total",
        "numa_node",
        "cpu_socket",
        "nvlink_group",
    ];

    if count < 4 {
        return (1..=count).map(|i| format!("col_{}", i)).collect();
    }

    let mut columns: Vec<String> = BASE
        .iter()
        .take(count)
        .map(|name| name.to_string())
        .collect();
    columns.extend((8..=count).map(|i| format!("extra_{}", i)));
    columns
}

/// Zip records with column names. Short records are padded with blanks,
/// surplus cells are dropped, and duplicate names keep the first column.
fn assign_columns(columns: &[String], records: &[Vec<String>]) -> Vec<Row> {
    records
        .iter()
        .map(|record| {
            let mut row = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = record.get(idx).cloned().unwrap_or_default();
                row.entry(column.clone()).or_insert(value);
            }
            row
        })
        .collect()
}

/// Extract rows from a telemetry upload, detecting whether the first row is a
/// header.
pub fn extract_rows(text: &str, delimiter: u8) -> Result<Vec<Row>> {
    let records = read_records(text, delimiter)?;
    let Some((first, rest)) = records.split_first() else {
        return Err(ParseError::EmptyTable);
    };

    if looks_like_header(first) {
        let columns: Vec<String> = first.iter().map(|c| canonicalize_column(c)).collect();
        debug!("Detected header row with {} columns: {:?}", columns.len(), columns);
        return Ok(assign_columns(&columns, rest));
    }

    let columns = positional_columns(first.len());
    debug!(
        "No header detected, naming {} columns by position: {:?}",
        columns.len(),
        columns
    );
    Ok(assign_columns(&columns, &records))
}

/// Parse delimited text whose first row is always the header
pub fn read_headered(text: &str, delimiter: u8) -> Result<Vec<Row>> {
    let records = read_records(text, delimiter)?;
    let Some((first, rest)) = records.split_first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = first.iter().map(|c| canonicalize_column(c)).collect();
    Ok(assign_columns(&columns, rest))
}
