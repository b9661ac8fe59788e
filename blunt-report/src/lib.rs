//! # blunt-report
//!
//! Renders a [`RaceOutcome`](blunt_core::RaceOutcome) for the terminal and
//! maps it to the process exit code.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blunt_report::{OutputFormat, Reporter};
//! use blunt_core::RaceOutcome;
//!
//! fn finish(outcome: &RaceOutcome) -> i32 {
//!     let reporter = match Reporter::new(OutputFormat::Text) {
//!         Ok(reporter) => reporter,
//!         Err(_) => return 2,
//!     };
//!     reporter
//!         .report(outcome, &mut std::io::stdout(), &mut std::io::stderr())
//!         .unwrap_or(2)
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::ReportContext;
pub use engine::{OutputFormat, Reporter, NOTE_PREFIX, ORCHESTRATION_ERROR_PREFIX};
pub use error::ReportError;
