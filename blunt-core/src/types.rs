//! Domain types for a blunt race.
//!
//! A [`DiagnosticSet`] can only be built through [`DiagnosticSet::new`], which
//! sorts and deduplicates, so every set that reaches the reporter is
//! deterministic regardless of the checker's own ordering.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CheckerFailure;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// No diagnostics from the trusted checker.
pub const EXIT_CLEAN: i32 = 0;
/// The trusted checker reported diagnostics.
pub const EXIT_DIAGNOSTICS: i32 = 1;
/// Neither checker produced a usable result.
pub const EXIT_ORCHESTRATION_FAILURE: i32 = 2;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which of the two racing checkers an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckerKind {
    /// Cold, stateless checker that re-analyzes everything (mypy).
    FullScan,
    /// Warm checker backed by a persistent daemon (dmypy).
    Daemon,
}

impl fmt::Display for CheckerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckerKind::FullScan => write!(f, "full-scan"),
            CheckerKind::Daemon => write!(f, "daemon"),
        }
    }
}

/// Severity of a single diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    /// Parse the severity word used in checker output (`error`, `warning`, `note`).
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" => Some(Severity::Note),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// Liveness of the warm daemon as observed from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DaemonStatus {
    Running,
    NotRunning,
    Stale,
    Crashed,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::Running => write!(f, "running"),
            DaemonStatus::NotRunning => write!(f, "not-running"),
            DaemonStatus::Stale => write!(f, "stale"),
            DaemonStatus::Crashed => write!(f, "crashed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One invocation's worth of input, shared read-only by both checkers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRequest {
    /// Files and directories to check, in the order given by the user.
    pub files: Vec<PathBuf>,
    /// Directory both checkers run in.
    pub working_dir: PathBuf,
    /// Checker flags forwarded verbatim, ahead of the files.
    #[serde(default)]
    pub flags: Vec<String>,
}

impl CheckRequest {
    pub fn new(files: Vec<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            files,
            working_dir: working_dir.into(),
            flags: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    /// `<flags...> <files...>` as passed to either checker.
    pub fn forwarded_args(&self) -> Vec<OsString> {
        self.flags
            .iter()
            .map(OsString::from)
            .chain(self.files.iter().map(|p| p.as_os_str().to_owned()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A normalized checker diagnostic.
///
/// Equality and hashing only consider `(path, line, column, message)`; two
/// records that differ only in severity or rule code are the same finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub line: u32,
    /// mypy omits the column unless `--show-column-numbers` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Diagnostic {
    fn position(&self) -> (&Path, u32, Option<u32>) {
        (self.path.as_path(), self.line, self.column)
    }

    fn identity(&self) -> (&Path, u32, Option<u32>, &str) {
        (self.path.as_path(), self.line, self.column, self.message.as_str())
    }
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Diagnostic {}

impl Hash for Diagnostic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)?;
        if let Some(column) = self.column {
            write!(f, ":{column}")?;
        }
        write!(f, ": {}: {}", self.severity, self.message)?;
        if let Some(code) = &self.code {
            write!(f, "  [{code}]")?;
        }
        Ok(())
    }
}

/// Sorted, deduplicated diagnostics from exactly one checker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiagnosticSet(Vec<Diagnostic>);

impl DiagnosticSet {
    /// Stable-sort by `(path, line, column)` and drop structural duplicates,
    /// keeping the first occurrence.
    pub fn new(mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|a, b| a.position().cmp(&b.position()));
        let mut seen = HashSet::with_capacity(diagnostics.len());
        diagnostics.retain(|d| seen.insert(d.clone()));
        Self(diagnostics)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }

    pub fn error_count(&self) -> usize {
        self.0
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Number of distinct files with at least one diagnostic.
    pub fn file_count(&self) -> usize {
        self.0
            .iter()
            .map(|d| d.path.as_path())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl<'a> IntoIterator for &'a DiagnosticSet {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Where a checker invocation ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum CompletionState {
    Pending,
    /// Exited with a conventional code (clean or "issues found").
    Succeeded,
    Failed { failure: CheckerFailure },
    TimedOut { after_ms: u64 },
}

/// One checker process, as recorded by the runner that owns it.
///
/// The process handle itself never leaves the runner; this is the record the
/// coordinator sees once the runner signals completion.
#[derive(Debug, Clone, Serialize)]
pub struct CheckerInvocation {
    pub checker: CheckerKind,
    pub program: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub state: CompletionState,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CheckerInvocation {
    pub fn pending(checker: CheckerKind, program: impl Into<String>) -> Self {
        Self {
            checker,
            program: program.into(),
            started_at: Utc::now(),
            duration_ms: 0,
            state: CompletionState::Pending,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.state == CompletionState::Succeeded
    }

    /// The hard failure behind a `Failed` or `TimedOut` state.
    pub fn failure(&self) -> Option<CheckerFailure> {
        match &self.state {
            CompletionState::Pending | CompletionState::Succeeded => None,
            CompletionState::Failed { failure } => Some(failure.clone()),
            CompletionState::TimedOut { after_ms } => Some(CheckerFailure::TimedOut {
                checker: self.checker,
                after_ms: *after_ms,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal state of the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    DaemonWonClean,
    FullScanWonClean,
    /// The daemon result was rejected; the full scan was used unconditionally.
    FullScanAfterDaemonFailure,
    /// The full scan failed hard; the daemon still produced a clean run.
    DaemonAfterFullScanFailure,
    BothFailed,
}

impl Decision {
    pub fn trusted(&self) -> Option<CheckerKind> {
        match self {
            Decision::DaemonWonClean | Decision::DaemonAfterFullScanFailure => {
                Some(CheckerKind::Daemon)
            }
            Decision::FullScanWonClean | Decision::FullScanAfterDaemonFailure => {
                Some(CheckerKind::FullScan)
            }
            Decision::BothFailed => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Decision::FullScanAfterDaemonFailure | Decision::DaemonAfterFullScanFailure
        )
    }
}

/// The single result of a run. Built once by the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct RaceOutcome {
    pub decision: Decision,
    pub trusted: Option<CheckerKind>,
    pub fallback: bool,
    pub diagnostics: DiagnosticSet,
    /// The trusted checker exited with its "issues found" code.
    pub issues_reported: bool,
    /// The trusted checker's trailing summary line, if it printed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Hard failures of the losing checker worth telling the user about.
    pub notices: Vec<String>,
    /// Concatenated failure reasons when `decision` is `BothFailed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip)]
    pub raw_stdout: String,
    #[serde(skip)]
    pub raw_stderr: String,
}

impl RaceOutcome {
    /// Outcome that trusts `invocation`'s already-parsed output.
    pub fn trusted(
        decision: Decision,
        invocation: &CheckerInvocation,
        diagnostics: DiagnosticSet,
        summary: Option<String>,
        issues_reported: bool,
    ) -> Self {
        Self {
            decision,
            trusted: decision.trusted(),
            fallback: decision.is_fallback(),
            diagnostics,
            issues_reported,
            summary,
            notices: Vec::new(),
            failure: None,
            raw_stdout: invocation.stdout.clone(),
            raw_stderr: invocation.stderr.clone(),
        }
    }

    pub fn both_failed(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::BothFailed,
            trusted: None,
            fallback: false,
            diagnostics: DiagnosticSet::default(),
            issues_reported: false,
            summary: None,
            notices: Vec::new(),
            failure: Some(reason.into()),
            raw_stdout: String::new(),
            raw_stderr: String::new(),
        }
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notices.push(notice.into());
        self
    }

    /// `0` clean, `1` diagnostics present, `2` orchestration failure.
    pub fn exit_code(&self) -> i32 {
        if self.decision == Decision::BothFailed {
            EXIT_ORCHESTRATION_FAILURE
        } else if !self.diagnostics.is_empty() || self.issues_reported {
            EXIT_DIAGNOSTICS
        } else {
            EXIT_CLEAN
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
