//! # lens-core
//!
//! Core types, errors and configuration for infralens - GPU fleet telemetry
//! and topology analysis.
//!
//! This crate provides the canonical data shapes that the ingestion engine
//! produces and the scoring layers consume:
//!
//! - [`Scenario`] and [`GpuRecord`], the fixed per-GPU snapshot shape
//! - [`TopologyOverlay`] and its non-destructive merge onto a scenario
//! - [`NodeCpuMap`], the transient NUMA node → CPU set mapping
//! - Error types ([`ParseError`] for ingestion, [`Error`] for everything else)
//! - Configuration loading and logging setup
//! - Bundled sample scenarios

pub mod config;
pub mod error;
pub mod logging;
pub mod presets;
pub mod topology;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{Config, IngestConfig, LoggingConfig};
pub use error::{Error, ParseError, Result};
pub use topology::{NodeCpuMap, TopologyInfo, TopologyOverlay};
pub use types::{GpuId, GpuRecord, Scenario};
