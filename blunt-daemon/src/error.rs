use thiserror::Error;

/// Error surface for daemon control commands.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to kill daemon (exit {exit_code:?}): {detail}")]
    KillFailed {
        exit_code: Option<i32>,
        detail: String,
    },
}
