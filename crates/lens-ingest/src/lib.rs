//! # lens-ingest
//!
//! Telemetry and topology ingestion for infralens.
//!
//! This crate turns loosely structured GPU fleet exports into a canonical
//! [`Scenario`]:
//! - Delimited telemetry with or without a header row (`nvidia-smi
//!   --query-gpu ... --format=csv`, spreadsheets) or JSON GPU lists
//! - Column-name and unit normalization through a static synonym table
//! - NUMA affinity from `numactl --hardware`, JSON or tables
//! - NVLink groups and CPU sockets from `nvidia-smi topo -m` matrices
//! - Non-destructive merge of the derived topology onto the telemetry
//!
//! Ingestion is synchronous and holds no state between calls, so an
//! [`Ingestor`] can be shared freely across threads.
//!
//! ## Example
//!
//! ```rust
//! use lens_ingest::Ingestor;
//! use lens_core::IngestConfig;
//!
//! let ingestor = Ingestor::new(IngestConfig::default());
//! let telemetry = b"index,utilization.gpu [%],memory.used [MiB],memory.total [MiB]\n\
//!                   0,92 %,135168 MiB,144384 MiB\n\
//!                   1,58 %,79872 MiB,144384 MiB\n";
//!
//! let scenario = ingestor.ingest("gpus.csv", telemetry, None, None).unwrap();
//! assert_eq!(scenario.name, "Uploaded (gpus.csv)");
//! assert_eq!(scenario.gpus.len(), 2);
//! assert_eq!(scenario.total_vram_gb, 141);
//! ```

pub mod affinity;
pub mod builder;
pub mod coerce;
pub mod fields;
pub mod strategy;
pub mod tabular;
pub mod topology;
pub mod union_find;

pub use affinity::{parse_affinity, parse_cpu_list};
pub use builder::ScenarioBuilder;
pub use fields::{Field, Row};
pub use topology::{parse_topology, parse_topology_matrix};

use fields::row_from_json;
use lens_core::{IngestConfig, NodeCpuMap, ParseError, Scenario, TopologyOverlay};
use serde_json::Value;
use tracing::{debug, info};

/// Result type for ingestion
pub type Result<T> = std::result::Result<T, ParseError>;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Runs uploads through row extraction, scenario building and the optional
/// topology merge.
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one upload.
    ///
    /// `filename` picks the format (`.json`, case-insensitive, selects the
    /// JSON path; anything else is read as delimited text) and names the
    /// scenario. Topology is merged only when `topo_text` is non-blank, using
    /// `affinity_text` (if any) to resolve CPU sockets. Topology and affinity
    /// problems never fail the call; they just leave the telemetry's own
    /// values in place.
    pub fn ingest(
        &self,
        filename: &str,
        raw: &[u8],
        topo_text: Option<&str>,
        affinity_text: Option<&str>,
    ) -> Result<Scenario> {
        let text = decode_upload(raw);
        if text.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let rows = if is_json_filename(filename) {
            self.extract_json_rows(&text)?
        } else {
            self.extract_rows(&text)?
        };

        let mut scenario = self.build_scenario(&format!("Uploaded ({})", filename), &rows)?;

        let mut topology_gpus = 0;
        if let Some(topo_text) = topo_text.filter(|t| !t.trim().is_empty()) {
            let nodes = self.parse_affinity(affinity_text.unwrap_or(""));
            let overlay = self.parse_topology(topo_text, &nodes);
            topology_gpus = overlay.len();
            scenario = overlay.apply(&scenario);
        }

        info!(
            "Ingested '{}': {} GPUs, {} GB per GPU, topology for {} GPUs",
            filename,
            scenario.gpus.len(),
            scenario.total_vram_gb,
            topology_gpus
        );
        Ok(scenario)
    }

    /// Extract rows from delimited telemetry text
    pub fn extract_rows(&self, text: &str) -> Result<Vec<Row>> {
        tabular::extract_rows(text, self.config.delimiter_byte())
    }

    /// Build a scenario from already extracted rows
    pub fn build_scenario(&self, name: &str, rows: &[Row]) -> Result<Scenario> {
        ScenarioBuilder::new(&self.config).build(name, rows)
    }

    /// Parse NUMA affinity text; unrecognised input yields an empty map
    pub fn parse_affinity(&self, text: &str) -> NodeCpuMap {
        let nodes = parse_affinity(text);
        debug!("Parsed affinity for {} NUMA nodes", nodes.len());
        nodes
    }

    /// Parse topology text; unrecognised input yields an empty overlay
    pub fn parse_topology(&self, text: &str, nodes: &NodeCpuMap) -> TopologyOverlay {
        let overlay = parse_topology(text, nodes);
        debug!("Parsed topology for {} GPUs", overlay.len());
        overlay
    }

    /// Rows from a JSON GPU list: a bare list, or an object holding the list
    /// under `gpus` (preferred) or `gpu`. Entries that are not objects are
    /// skipped.
    fn extract_json_rows(&self, text: &str) -> Result<Vec<Row>> {
        let value: Value = serde_json::from_str(text)?;
        let payload = match &value {
            Value::Object(object) => object
                .get("gpus")
                .or_else(|| object.get("gpu"))
                .ok_or_else(|| ParseError::unsupported_json("expected a 'gpus' or 'gpu' key"))?,
            Value::Array(_) => &value,
            _ => return Err(ParseError::unsupported_json("expected a list or an object")),
        };

        let Value::Array(entries) = payload else {
            return Err(ParseError::unsupported_json("JSON GPU payload must be a list"));
        };

        let rows: Vec<Row> = entries
            .iter()
            .filter_map(Value::as_object)
            .map(row_from_json)
            .collect();
        debug!("Extracted {} rows from {} JSON entries", rows.len(), entries.len());
        Ok(rows)
    }
}

/// Ingest with the default configuration
pub fn ingest(
    filename: &str,
    raw: &[u8],
    topo_text: Option<&str>,
    affinity_text: Option<&str>,
) -> Result<Scenario> {
    Ingestor::default().ingest(filename, raw, topo_text, affinity_text)
}

/// Decode upload bytes: invalid UTF-8 sequences are dropped, a leading
/// byte-order mark is ignored and surrounding whitespace trimmed.
fn decode_upload(raw: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let cleaned: String = decoded
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    cleaned
        .trim_start_matches(BYTE_ORDER_MARK)
        .trim()
        .to_string()
}

fn is_json_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".json")
}
