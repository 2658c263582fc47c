use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("input file not found: {0}")]
    #[diagnostic(help("pass --csv with the path to the entity list"))]
    InputMissing(PathBuf),

    #[error("failed to read input file at {path}: {message}")]
    InputRead { path: PathBuf, message: String },

    #[error("input file is missing required column: {0}")]
    InputColumn(String),

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} returned status {status}")]
    TransportStatus { url: String, status: u16 },

    #[error("dataset file not found: {0}")]
    DatasetNotFound(PathBuf),

    #[error("failed to parse dataset: {0}")]
    DatasetParse(String),

    #[error("failed to serialize output: {0}")]
    Serialization(String),

    #[error("failed to write CSV: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HarvestError {
    /// True for failures of a single outbound request, as opposed to local
    /// setup or filesystem problems.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HarvestError::Transport { .. } | HarvestError::TransportStatus { .. }
        )
    }
}
