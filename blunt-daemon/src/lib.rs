//! Warm-daemon health: liveness probe, reset, and result classification.

mod error;
pub mod monitor;
pub mod signatures;

pub use error::DaemonError;
pub use monitor::DaemonMonitor;
pub use signatures::{classify, match_signature, DaemonRecoverableFailure, DaemonVerdict};
