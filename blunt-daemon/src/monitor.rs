//! Daemon liveness probe and reset.

use std::path::Path;

use blunt_core::{
    BluntConfig, CheckerFailure, CheckerInvocation, CheckerKind, CompletionState, DaemonConfig,
    DaemonStatus,
};
use blunt_runner::ProcessRunner;

use crate::error::DaemonError;
use crate::signatures::{classify, match_signature, DaemonVerdict};

/// Observes the daemon checker from the outside. Owns no daemon state.
#[derive(Debug, Clone)]
pub struct DaemonMonitor {
    runner: ProcessRunner,
    config: DaemonConfig,
    require_summary: bool,
}

impl DaemonMonitor {
    pub fn new(runner: ProcessRunner, config: DaemonConfig, require_summary: bool) -> Self {
        Self {
            runner,
            config,
            require_summary,
        }
    }

    pub fn from_config(config: &BluntConfig) -> Self {
        Self::new(
            ProcessRunner::from_config(config),
            config.daemon.clone(),
            config.require_summary,
        )
    }

    /// Ask the daemon whether it is up (`dmypy status`).
    pub async fn probe(&self, working_dir: &Path) -> DaemonStatus {
        let command = self.config.control_command(&self.config.status_args);
        let invocation = self
            .runner
            .run_command(
                CheckerKind::Daemon,
                &command,
                working_dir,
                Some(self.config.probe_timeout()),
            )
            .await;
        let status = self.status_from_probe(&invocation);
        tracing::debug!(%status, exit_code = ?invocation.exit_code, "daemon probe");
        status
    }

    /// Stop the daemon so the next run starts a fresh one (`dmypy kill`).
    pub async fn kill(&self, working_dir: &Path) -> Result<(), DaemonError> {
        let command = self.config.control_command(&self.config.kill_args);
        let invocation = self
            .runner
            .run_command(
                CheckerKind::Daemon,
                &command,
                working_dir,
                Some(self.config.probe_timeout()),
            )
            .await;

        let stderr = invocation.stderr.trim();
        if invocation.exit_code != Some(0) || !stderr.is_empty() {
            let detail = match invocation.failure() {
                Some(failure) => failure.to_string(),
                None if stderr.is_empty() => "(empty)".to_string(),
                None => stderr.to_string(),
            };
            return Err(DaemonError::KillFailed {
                exit_code: invocation.exit_code,
                detail,
            });
        }
        tracing::info!("daemon killed");
        Ok(())
    }

    /// See [`crate::signatures::classify`].
    pub fn classify(&self, invocation: &CheckerInvocation) -> DaemonVerdict {
        classify(invocation, &self.config.signatures, self.require_summary)
    }

    fn status_from_probe(&self, invocation: &CheckerInvocation) -> DaemonStatus {
        if let Some(signature) =
            match_signature(&self.config.signatures, &invocation.stdout, &invocation.stderr)
        {
            return signature.status;
        }
        match &invocation.state {
            CompletionState::TimedOut { .. } => DaemonStatus::Stale,
            CompletionState::Failed {
                failure: CheckerFailure::ExecutableMissing { .. },
            } => DaemonStatus::NotRunning,
            _ if invocation.exit_code == Some(0) => DaemonStatus::Running,
            _ => DaemonStatus::NotRunning,
        }
    }
}
