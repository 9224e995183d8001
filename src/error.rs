//! Error taxonomy for the analysis core.

use thiserror::Error;

/// Errors that stop a run (or a configuration step) outright.
///
/// Per-unit and per-detector failures never surface here; they are recorded
/// in the report as `ErrorEntry` values.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Invalid configuration, unknown detector, or duplicate registration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// None of the requested detectors resolved.
    #[error("no detectors to run (requested: {requested})")]
    NoDetectors { requested: String },

    /// A parse session could not be opened.
    #[error("parser initialization failed: {0}")]
    Parser(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
