//! Error types for phenoflow

use thiserror::Error;

/// Errors that can occur while fetching or featurizing participant data
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No data for participant: {0}")]
    NoData(String),

    #[error("Domains were not set for the participant and were not provided")]
    MissingDomains,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Frame has not been binned yet")]
    NotBinned,

    #[error("Date range error: {0}")]
    DateRangeError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Server request failed: {0}")]
    RequestError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<csv::Error> for FeatureError {
    fn from(e: csv::Error) -> Self {
        FeatureError::ExportError(e.to_string())
    }
}
