//! Checker output parsing for `blunt-diagnostics`.
//!
//! `parse(checker, raw)` turns a checker's stdout into a [`DiagnosticSet`].
//! Only lines in the conventional `path:line[:col]: severity: message  [code]`
//! shape carry content. An end position after the column
//! (`--show-error-end`) is accepted and ignored. Everything else (banners, summaries, blank lines) is
//! dropped, except lines that *start* like a diagnostic but do not finish
//! like one, which become [`ParseWarning`]s.
//!
//! Parsing is a pure function of its input: the same text always yields the
//! same set.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use blunt_core::types::{CheckerKind, Diagnostic, DiagnosticSet, Severity};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A line that looked like a diagnostic but could not be read as one.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{checker} output line {line_number}: {reason}: {text}")]
pub struct ParseWarning {
    pub checker: CheckerKind,
    /// 1-based line number within the raw output.
    pub line_number: usize,
    pub reason: String,
    pub text: String,
}

/// The checker's closing summary line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Summary {
    /// `Success: no issues found in N source files`
    Success { line: String, files: u32 },
    /// `Found N errors in M files (checked K source files)`
    Errors {
        line: String,
        errors: u32,
        files: u32,
        checked: u32,
    },
}

impl Summary {
    pub fn line(&self) -> &str {
        match self {
            Summary::Success { line, .. } | Summary::Errors { line, .. } => line,
        }
    }
}

/// Everything the parser could read out of one checker's stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedOutput {
    pub diagnostics: DiagnosticSet,
    pub summary: Option<Summary>,
    pub warnings: Vec<ParseWarning>,
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn diagnostic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<path>.+?):(?P<line>\d+):(?:(?P<column>\d+):(?:\d+:\d+:)?)?\s+(?P<severity>[a-z]+):\s*(?P<message>.*?)(?:\s+\[(?P<code>[\w-]+)\])?\s*$",
        )
        .expect("diagnostic pattern is valid")
    })
}

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.+?:\d+:").expect("prefix pattern is valid"))
}

fn success_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Success: no issues found in (?P<files>\d+) source files?$")
            .expect("success pattern is valid")
    })
}

fn errors_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^Found (?P<errors>\d+) errors? in (?P<files>\d+) files? \(checked (?P<checked>\d+) source files?\)$",
        )
        .expect("errors pattern is valid")
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a checker's stdout into its sorted, deduplicated diagnostics.
pub fn parse(checker: CheckerKind, raw: &str) -> DiagnosticSet {
    parse_output(checker, raw).diagnostics
}

/// Parse diagnostics, summary line, and parse warnings in one pass.
pub fn parse_output(checker: CheckerKind, raw: &str) -> ParsedOutput {
    let mut diagnostics = Vec::new();
    let mut warnings = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            LineKind::Diagnostic(diagnostic) => diagnostics.push(diagnostic),
            LineKind::Malformed(reason) => warnings.push(ParseWarning {
                checker,
                line_number: index + 1,
                reason: reason.to_string(),
                text: line.to_string(),
            }),
            LineKind::Other => {}
        }
    }

    ParsedOutput {
        diagnostics: DiagnosticSet::new(diagnostics),
        summary: find_summary(raw),
        warnings,
    }
}

/// The summary line, if it is the last non-blank line of `raw`.
pub fn find_summary(raw: &str) -> Option<Summary> {
    let last = raw.lines().map(str::trim_end).rfind(|l| !l.is_empty())?;

    if let Some(caps) = success_re().captures(last) {
        return Some(Summary::Success {
            line: last.to_string(),
            files: caps["files"].parse().ok()?,
        });
    }
    if let Some(caps) = errors_re().captures(last) {
        return Some(Summary::Errors {
            line: last.to_string(),
            errors: caps["errors"].parse().ok()?,
            files: caps["files"].parse().ok()?,
            checked: caps["checked"].parse().ok()?,
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

enum LineKind {
    Diagnostic(Diagnostic),
    Malformed(&'static str),
    Other,
}

fn parse_line(line: &str) -> LineKind {
    let Some(caps) = diagnostic_re().captures(line) else {
        return if prefix_re().is_match(line) {
            LineKind::Malformed("missing severity or message")
        } else {
            LineKind::Other
        };
    };

    let Ok(line_no) = caps["line"].parse::<u32>() else {
        return LineKind::Malformed("line number out of range");
    };
    let column = match caps.name("column").map(|m| m.as_str().parse::<u32>()) {
        None => None,
        Some(Ok(column)) => Some(column),
        Some(Err(_)) => return LineKind::Malformed("column number out of range"),
    };
    let message = caps["message"].trim();
    if message.is_empty() {
        return LineKind::Malformed("empty message");
    }
    let Some(severity) = Severity::from_label(&caps["severity"]) else {
        return LineKind::Malformed("unknown severity");
    };

    LineKind::Diagnostic(Diagnostic {
        path: PathBuf::from(&caps["path"]),
        line: line_no,
        column,
        severity,
        message: message.to_string(),
        code: caps.name("code").map(|m| m.as_str().to_string()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_all_fields() {
        let set = parse(
            CheckerKind::FullScan,
            "a.py:3:1: error: bad type  [assignment]\n",
        );
        let d = &set.as_slice()[0];
        assert_eq!(d.path, PathBuf::from("a.py"));
        assert_eq!(d.line, 3);
        assert_eq!(d.column, Some(1));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "bad type");
        assert_eq!(d.code.as_deref(), Some("assignment"));
    }

    #[test]
    fn brackets_inside_message_are_not_a_code() {
        let set = parse(
            CheckerKind::Daemon,
            "m.py:7: error: Argument 1 has incompatible type \"list[int]\"; expected \"str\"  [arg-type]",
        );
        let d = &set.as_slice()[0];
        assert_eq!(d.column, None);
        assert_eq!(
            d.message,
            "Argument 1 has incompatible type \"list[int]\"; expected \"str\""
        );
        assert_eq!(d.code.as_deref(), Some("arg-type"));
    }

    #[test]
    fn end_position_is_not_part_of_the_path() {
        let set = parse(
            CheckerKind::FullScan,
            "a.py:3:1:3:5: error: bad type  [assignment]\n",
        );
        let d = &set.as_slice()[0];
        assert_eq!(d.path, PathBuf::from("a.py"));
        assert_eq!(d.line, 3);
        assert_eq!(d.column, Some(1));
        assert_eq!(d.code.as_deref(), Some("assignment"));
    }

    #[test]
    fn unknown_severity_is_a_warning() {
        let out = parse_output(CheckerKind::Daemon, "a.py:3: fatal: no luck\n");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].reason, "unknown severity");
    }

    #[test]
    fn prefix_without_severity_is_a_warning() {
        let out = parse_output(CheckerKind::FullScan, "ok\na.py:3: something odd\n");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].line_number, 2);
        assert_eq!(out.warnings[0].text, "a.py:3: something odd");
    }

    #[test]
    fn summary_must_be_last_line() {
        assert!(find_summary("Success: no issues found in 3 source files\nextra\n").is_none());
        assert_eq!(
            find_summary("Success: no issues found in 1 source file\n\n"),
            Some(Summary::Success {
                line: "Success: no issues found in 1 source file".into(),
                files: 1
            })
        );
    }
}
