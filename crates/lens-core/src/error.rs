//! Error handling for infralens
//!
//! Ingestion has exactly one failure kind, [`ParseError`], raised only when an
//! upload is unusable as a whole. Everything else (configuration loading,
//! logging setup) goes through the wider [`Error`] type.

/// Result type alias for infralens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Structural ingestion failure: the input cannot produce a scenario at all.
///
/// Field-level problems never surface here; they resolve to defaults.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The uploaded bytes decode to nothing but whitespace
    #[error("Uploaded file is empty")]
    EmptyInput,

    /// Delimited text had no row with a non-blank cell
    #[error("Uploaded table is empty: no non-blank rows found")]
    EmptyTable,

    /// Row extraction succeeded but produced no GPU rows
    #[error("No GPU rows detected in uploaded file")]
    NoGpuRows,

    /// JSON decoded but is not a list or a `{gpus: [...]}` / `{gpu: [...]}` object
    #[error("Unsupported JSON structure: {0}")]
    UnsupportedJson(String),

    /// The payload was expected to be JSON but failed to decode
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The delimited reader rejected the payload
    #[error("Malformed delimited payload: {0}")]
    Delimited(String),
}

impl ParseError {
    /// Create an unsupported JSON shape error
    pub fn unsupported_json(msg: impl Into<String>) -> Self {
        Self::UnsupportedJson(msg.into())
    }

    /// Create a delimited reader error
    pub fn delimited(msg: impl Into<String>) -> Self {
        Self::Delimited(msg.into())
    }

    /// Ingestion stage at which the failure happened
    pub fn stage(&self) -> &'static str {
        match self {
            ParseError::EmptyInput => "decode",
            ParseError::EmptyTable => "rows",
            ParseError::NoGpuRows => "build",
            ParseError::UnsupportedJson(_) | ParseError::Json(_) => "json",
            ParseError::Delimited(_) => "delimited",
        }
    }
}

/// Unified error type for infralens
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ingestion failures
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Configuration values that failed validation
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Configuration source errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Check if this error came out of ingestion
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse",
            Error::InvalidConfiguration(_) => "configuration",
            Error::Config(_) => "config",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
        }
    }
}
