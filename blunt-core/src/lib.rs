//! blunt core library: domain types, configuration and the failure taxonomy.
//!
//! - [`types`]: request, diagnostics, invocation and outcome records
//! - [`error`]: [`CheckerFailure`] and [`ConfigError`]
//! - [`config`]: [`BluntConfig`] load / defaults

pub mod config;
pub mod error;
pub mod types;

pub use config::{BluntConfig, CommandSpec, DaemonConfig, DaemonSignature, ParseWarningMode};
pub use error::{CheckerFailure, ConfigError};
pub use types::{
    CheckRequest, CheckerInvocation, CheckerKind, CompletionState, DaemonStatus, Decision,
    Diagnostic, DiagnosticSet, RaceOutcome, Severity, EXIT_CLEAN, EXIT_DIAGNOSTICS,
    EXIT_ORCHESTRATION_FAILURE,
};
