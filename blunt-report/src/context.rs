//! Template context: the serializable rendering payload built from a [`RaceOutcome`].

use serde::Serialize;

use blunt_core::{CheckerKind, Decision, Diagnostic, RaceOutcome, Severity};

use crate::error::ReportError;

/// What a text template can see.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub decision: Decision,
    pub checker: Option<CheckerKind>,
    pub fallback: bool,
    pub diagnostics: Vec<DiagnosticCtx>,
    pub summary: Option<String>,
    pub error_count: usize,
    pub file_count: usize,
    pub exit_code: i32,
}

/// One diagnostic, with its canonical one-line rendering precomputed.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticCtx {
    pub path: String,
    pub line: u32,
    pub column: Option<u32>,
    pub severity: Severity,
    pub message: String,
    pub code: Option<String>,
    /// `path:line[:col]: severity: message  [code]`
    pub rendered: String,
}

impl From<&Diagnostic> for DiagnosticCtx {
    fn from(diagnostic: &Diagnostic) -> Self {
        Self {
            path: diagnostic.path.display().to_string(),
            line: diagnostic.line,
            column: diagnostic.column,
            severity: diagnostic.severity,
            message: diagnostic.message.clone(),
            code: diagnostic.code.clone(),
            rendered: diagnostic.to_string(),
        }
    }
}

impl ReportContext {
    pub fn from_outcome(outcome: &RaceOutcome) -> Self {
        Self {
            decision: outcome.decision,
            checker: outcome.trusted,
            fallback: outcome.fallback,
            diagnostics: outcome.diagnostics.iter().map(DiagnosticCtx::from).collect(),
            summary: outcome.summary.clone(),
            error_count: outcome.diagnostics.error_count(),
            file_count: outcome.diagnostics.file_count(),
            exit_code: outcome.exit_code(),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, ReportError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}
