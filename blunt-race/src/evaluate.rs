//! Turning a finished invocation into "usable" or "rejected".

use blunt_core::{CheckerFailure, CheckerInvocation, CheckerKind, ParseWarningMode};
use blunt_daemon::{DaemonMonitor, DaemonRecoverableFailure, DaemonVerdict};
use blunt_diagnostics::{parse_output, ParsedOutput};

/// Verdict on one finished checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// A clean run; its parsed output may be trusted.
    Clean(ParsedOutput),
    Rejected(Rejection),
}

/// Why a finished checker's result cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The daemon itself is unhealthy. Absorbed whenever the full scan succeeds.
    Recoverable(DaemonRecoverableFailure),
    Hard(CheckerFailure),
}

impl Rejection {
    pub fn reason(&self) -> String {
        match self {
            Rejection::Recoverable(failure) => failure.to_string(),
            Rejection::Hard(failure) => failure.to_string(),
        }
    }

    /// Text to show the user even though the other checker succeeded.
    pub fn notice(&self) -> Option<String> {
        match self {
            Rejection::Recoverable(_) => None,
            Rejection::Hard(failure) => Some(failure.to_string()),
        }
    }

    /// Whether killing the daemon could help the next run.
    pub fn warrants_reset(&self) -> bool {
        !matches!(
            self,
            Rejection::Hard(CheckerFailure::ExecutableMissing { .. })
        )
    }
}

/// A full scan is usable whenever it ran to completion.
pub fn evaluate_full_scan(invocation: &CheckerInvocation, mode: ParseWarningMode) -> Evaluation {
    if let Some(failure) = invocation.failure() {
        return Evaluation::Rejected(Rejection::Hard(failure));
    }
    Evaluation::Clean(parse_logged(CheckerKind::FullScan, &invocation.stdout, mode))
}

/// A daemon run must also pass the health monitor's classification.
pub fn evaluate_daemon(
    invocation: &CheckerInvocation,
    monitor: &DaemonMonitor,
    mode: ParseWarningMode,
) -> Evaluation {
    match monitor.classify(invocation) {
        DaemonVerdict::Trusted => {
            Evaluation::Clean(parse_logged(CheckerKind::Daemon, &invocation.stdout, mode))
        }
        DaemonVerdict::Recoverable(failure) => {
            Evaluation::Rejected(Rejection::Recoverable(failure))
        }
        DaemonVerdict::Hard(failure) => Evaluation::Rejected(Rejection::Hard(failure)),
    }
}

fn parse_logged(checker: CheckerKind, stdout: &str, mode: ParseWarningMode) -> ParsedOutput {
    let parsed = parse_output(checker, stdout);
    for warning in &parsed.warnings {
        match mode {
            ParseWarningMode::Warn => tracing::warn!(%warning, "unparseable diagnostic line"),
            ParseWarningMode::Skip => tracing::trace!(%warning, "skipping unparseable line"),
        }
    }
    parsed
}
