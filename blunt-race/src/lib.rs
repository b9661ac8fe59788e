//! Race-and-fallback orchestration of a full-scan and a daemon checker.
//!
//! [`RaceCoordinator::race`] starts both checkers, trusts the first clean
//! result, and falls back to the full scan whenever the daemon's result cannot
//! be trusted. Exactly one checker's diagnostics end up in the
//! [`RaceOutcome`](blunt_core::RaceOutcome). Work that may outlive the
//! decision comes back as a [`Cleanup`].

pub mod cleanup;
pub mod coordinator;
pub mod evaluate;

pub use cleanup::Cleanup;
pub use coordinator::{Decided, RaceCoordinator};
pub use evaluate::{evaluate_daemon, evaluate_full_scan, Evaluation, Rejection};
