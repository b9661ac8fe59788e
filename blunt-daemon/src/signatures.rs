//! Textual classification of daemon results.
//!
//! The daemon reports its own ill health through exit codes and free-form
//! messages, so recognizing it is a substring match against the configured
//! [`DaemonSignature`]s. All of that lives in [`classify`]; the coordinator
//! only ever sees a [`DaemonVerdict`].
//!
//! Precedence:
//! 1. a signature match anywhere in stdout or stderr → `Recoverable`
//! 2. a hard runner failure (missing, crashed, timed out) → `Hard`
//! 3. anything unexpected in an otherwise successful run → `Recoverable`
//! 4. `Trusted`

use serde::Serialize;
use thiserror::Error;

use blunt_core::{CheckerFailure, CheckerInvocation, DaemonSignature, DaemonStatus};

/// The daemon, not the code under check, is the problem. Never user-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("daemon {status}: {reason}")]
pub struct DaemonRecoverableFailure {
    pub status: DaemonStatus,
    pub reason: String,
}

/// What the coordinator may do with a finished daemon invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonVerdict {
    Trusted,
    Recoverable(DaemonRecoverableFailure),
    Hard(CheckerFailure),
}

impl DaemonVerdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, DaemonVerdict::Trusted)
    }
}

/// First signature found in `stdout` or `stderr`, case-insensitively.
pub fn match_signature<'a>(
    signatures: &'a [DaemonSignature],
    stdout: &str,
    stderr: &str,
) -> Option<&'a DaemonSignature> {
    let stdout = stdout.to_lowercase();
    let stderr = stderr.to_lowercase();
    signatures.iter().find(|signature| {
        let pattern = signature.pattern.to_lowercase();
        stdout.contains(&pattern) || stderr.contains(&pattern)
    })
}

/// Decide whether a finished daemon invocation can be trusted.
pub fn classify(
    invocation: &CheckerInvocation,
    signatures: &[DaemonSignature],
    require_summary: bool,
) -> DaemonVerdict {
    if let Some(signature) = match_signature(signatures, &invocation.stdout, &invocation.stderr) {
        return DaemonVerdict::Recoverable(DaemonRecoverableFailure {
            status: signature.status,
            reason: format!("output matched '{}'", signature.pattern),
        });
    }

    if let Some(failure) = invocation.failure() {
        return DaemonVerdict::Hard(failure);
    }

    let stderr = invocation.stderr.trim();
    if !stderr.is_empty() {
        return DaemonVerdict::Recoverable(DaemonRecoverableFailure {
            status: DaemonStatus::Stale,
            reason: format!("unexpected stderr output: {}", first_line(stderr)),
        });
    }

    if require_summary && blunt_diagnostics::find_summary(&invocation.stdout).is_none() {
        return DaemonVerdict::Recoverable(DaemonRecoverableFailure {
            status: DaemonStatus::Stale,
            reason: "output has no summary line".to_string(),
        });
    }

    DaemonVerdict::Trusted
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
