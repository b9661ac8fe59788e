//! Rendering a [`RaceOutcome`] to stdout and stderr.
//!
//! | Stream | Content                                                   |
//! |--------|-----------------------------------------------------------|
//! | stdout | type diagnostics and the summary line, nothing else       |
//! | stderr | `bmypy: note:` notices, `bmypy: orchestration error:`     |
//!
//! Orchestration problems never share a stream with type diagnostics, so
//! "your code has errors" and "the tooling broke" stay distinguishable.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tera::Tera;

use blunt_core::RaceOutcome;

use crate::context::ReportContext;
use crate::error::ReportError;

pub const ORCHESTRATION_ERROR_PREFIX: &str = "bmypy: orchestration error:";
pub const NOTE_PREFIX: &str = "bmypy: note:";

const TEXT_TEMPLATE: &str = "diagnostics.tera";
const EMBEDDED_TEXT_TEMPLATE: &str = include_str!("templates/diagnostics.tera");

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}' (expected text or json)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Writes one outcome and hands back the process exit code.
pub struct Reporter {
    tera: Tera,
    format: OutputFormat,
    raw: bool,
}

impl Reporter {
    /// Text reporter backed by the embedded template.
    pub fn new(format: OutputFormat) -> Result<Self, ReportError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEXT_TEMPLATE, EMBEDDED_TEXT_TEMPLATE)?;
        Ok(Self {
            tera,
            format,
            raw: false,
        })
    }

    /// Replace the embedded text template with the file at `path`.
    pub fn with_template(mut self, path: &Path) -> Result<Self, ReportError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        self.tera.add_raw_template(TEXT_TEMPLATE, &contents)?;
        Ok(self)
    }

    /// Pass the trusted checker's own output through instead of rendering.
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn report(
        &self,
        outcome: &RaceOutcome,
        stdout: &mut impl Write,
        stderr: &mut impl Write,
    ) -> Result<i32, ReportError> {
        if self.format == OutputFormat::Json {
            serde_json::to_writer_pretty(&mut *stdout, outcome)?;
            writeln!(stdout)?;
        } else if self.raw {
            stdout.write_all(outcome.raw_stdout.as_bytes())?;
            if !outcome.raw_stderr.is_empty() {
                stderr.write_all(b"STDERR:\n")?;
                stderr.write_all(outcome.raw_stderr.as_bytes())?;
            }
        } else {
            stdout.write_all(self.render_text(outcome)?.as_bytes())?;
        }

        for notice in &outcome.notices {
            writeln!(stderr, "{NOTE_PREFIX} {notice}")?;
        }
        if let Some(failure) = &outcome.failure {
            writeln!(stderr, "{ORCHESTRATION_ERROR_PREFIX} {failure}")?;
        }
        stdout.flush()?;
        stderr.flush()?;
        Ok(outcome.exit_code())
    }

    pub fn render_text(&self, outcome: &RaceOutcome) -> Result<String, ReportError> {
        let context = ReportContext::from_outcome(outcome).to_tera_context()?;
        Ok(self.tera.render(TEXT_TEMPLATE, &context)?)
    }
}
