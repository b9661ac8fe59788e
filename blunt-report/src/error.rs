//! Error types for blunt-report.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop an outcome from reaching the terminal.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    #[error("outcome serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a user template.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing to stdout or stderr.
    #[error("failed to write report: {0}")]
    Write(#[from] std::io::Error),
}
