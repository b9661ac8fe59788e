//! Error types for blunt-core.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::CheckerKind;

/// Hard failure of a single checker invocation.
///
/// These are values carried by an invocation, not `Err` returns: the
/// coordinator decides whether a failure is fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CheckerFailure {
    /// The checker program could not be found on disk or on `PATH`.
    #[error("{checker} checker executable not found: {program}")]
    ExecutableMissing { checker: CheckerKind, program: String },

    /// Abnormal termination: killed by a signal, or an exit code outside the
    /// "ran to completion" range.
    #[error("{checker} checker crashed: {detail}")]
    CheckerCrashed { checker: CheckerKind, detail: String },

    /// The per-invocation wall-clock limit expired and the process was killed.
    #[error("{checker} checker timed out after {after_ms}ms")]
    TimedOut { checker: CheckerKind, after_ms: u64 },
}

/// All errors that can arise from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An explicitly requested config file does not exist.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// The file parsed but describes something unusable.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
