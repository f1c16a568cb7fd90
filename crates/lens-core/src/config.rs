//! Configuration management for infralens
//!
//! Supports YAML files and environment variable overrides on top of built-in
//! defaults. The defaults reproduce the documented ingestion behaviour exactly,
//! so most hosts never need a config file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingestion defaults and parsing options
    pub ingest: IngestConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Ok(config_path) = std::env::var("LENS_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            for path in &["./lens.yaml", "/etc/lens/config.yaml"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        // LENS_INGEST__DEFAULT_VRAM_TOTAL_MIB=98304 -> ingest.default_vram_total_mib
        builder = builder.add_source(
            config::Environment::with_prefix("LENS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::metadata(&path)?;

        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let config = builder.build()?;
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let parsed: Self = serde_yaml::from_str(yaml)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Ingestion defaults and parsing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Per-GPU total VRAM assumed when the input reports none, in MiB like the
    /// memory columns it stands in for
    pub default_vram_total_mib: f64,

    /// Lower bound of the synthesized network score
    pub network_score_floor: f64,

    /// Weight of utilization in the synthesized network score
    pub network_score_slope: f64,

    /// Field delimiter for tabular uploads
    pub delimiter: char,
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_vram_total_mib(mut self, mib: f64) -> Self {
        self.default_vram_total_mib = mib;
        self
    }

    pub fn with_network_score_proxy(mut self, floor: f64, slope: f64) -> Self {
        self.network_score_floor = floor;
        self.network_score_slope = slope;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Delimiter as the single byte the tabular reader expects
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }

    /// Network score proxy for a GPU with no direct network signal
    pub fn synthesize_network_score(&self, gpu_util: f64) -> f64 {
        let floor = self.network_score_floor;
        ((gpu_util / 100.0) * self.network_score_slope + floor).max(floor).min(1.0)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_vram_total_mib.is_finite() && self.default_vram_total_mib > 0.0) {
            return Err(crate::Error::config("Default VRAM total must be a positive number of MiB"));
        }

        if !(0.0..=1.0).contains(&self.network_score_floor) {
            return Err(crate::Error::config("Network score floor must be between 0 and 1"));
        }

        if !(self.network_score_slope.is_finite() && self.network_score_slope >= 0.0) {
            return Err(crate::Error::config("Network score slope must be >= 0"));
        }

        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(crate::Error::config(format!(
                "Unusable delimiter: {:?}",
                self.delimiter
            )));
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_vram_total_mib: 80.0,
            network_score_floor: 0.2,
            network_score_slope: 0.8,
            delimiter: ',',
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, overridden by `RUST_LOG`
    pub level: String,

    /// Log format (json or text)
    pub format: String,

    /// Include the event target in log lines
    pub show_target: bool,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        match self.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(crate::Error::config(format!("Unknown log format: {}", other))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
        }
    }
}
