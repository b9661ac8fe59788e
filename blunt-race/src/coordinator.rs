//! The race state machine.
//!
//! ```text
//! Idle ─► BothRunning ─┬─► DaemonWonClean ───────────────┐
//!                      ├─► FullScanWonClean ─────────────┤
//!                      ├─► DaemonFailedWaitingFullScan ──┼─► Decided
//!                      ├─► FullScanFailedWaitingDaemon ──┤
//!                      └─► BothFailed ───────────────────┘
//! ```
//!
//! Each checker runs on its own task and is only ever touched by that task.
//! The coordinator suspends in one place, a `biased` select over the two
//! task handles with the daemon polled first, so when both are already done
//! the daemon result is inspected first and wins if clean. Dropping a
//! [`RunnerTask`] aborts it, so every exit path (decision, global timeout)
//! cancels whatever is still running.
//!
//! The global timeout covers the decision only. The grace period of a losing
//! daemon and daemon resets are handed back as a [`Cleanup`] for the caller
//! to run after reporting.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use blunt_core::{
    BluntConfig, CheckRequest, CheckerInvocation, CheckerKind, DaemonStatus, Decision,
    RaceOutcome,
};
use blunt_daemon::DaemonMonitor;
use blunt_diagnostics::ParsedOutput;
use blunt_runner::{ProcessRunner, RunnerTask};

use crate::cleanup::Cleanup;
use crate::evaluate::{evaluate_daemon, evaluate_full_scan, Evaluation, Rejection};

/// Runs one race per [`race`](Self::race) call. Holds configuration only, so
/// a single coordinator can serve any number of sequential or concurrent runs.
#[derive(Debug, Clone)]
pub struct RaceCoordinator {
    config: BluntConfig,
    runner: ProcessRunner,
    monitor: DaemonMonitor,
}

/// A decided race. `outcome` is final; `cleanup` may still be running.
#[derive(Debug)]
pub struct Decided {
    pub outcome: RaceOutcome,
    pub cleanup: Cleanup,
}

/// What a race learned before its decision. Outlives a global timeout.
#[derive(Debug, Default)]
struct Progress {
    full_scan_failure: Option<String>,
    daemon_failure: Option<String>,
    cleanup: Cleanup,
}

impl Progress {
    fn timed_out(&self, limit: Duration) -> RaceOutcome {
        let cancelled = |checker: CheckerKind| format!("{checker} checker cancelled");
        let full = self
            .full_scan_failure
            .clone()
            .unwrap_or_else(|| cancelled(CheckerKind::FullScan));
        let daemon = self
            .daemon_failure
            .clone()
            .unwrap_or_else(|| cancelled(CheckerKind::Daemon));
        let reason = format!("global timeout after {}s: {full}; {daemon}", limit.as_secs());
        tracing::error!(%reason, "global timeout expired");
        RaceOutcome::both_failed(reason)
    }
}

impl RaceCoordinator {
    pub fn new(config: BluntConfig) -> Self {
        let runner = ProcessRunner::from_config(&config);
        let monitor = DaemonMonitor::from_config(&config);
        Self {
            config,
            runner,
            monitor,
        }
    }

    pub fn config(&self) -> &BluntConfig {
        &self.config
    }

    /// Race both checkers against `request` and decide on a single outcome.
    ///
    /// Returns as soon as the outcome is known. Run [`Cleanup::finish`] on the
    /// returned cleanup once the outcome has been reported, or drop it to
    /// cancel the leftovers.
    pub async fn race(&self, request: &CheckRequest) -> Decided {
        let mut progress = Progress::default();
        let outcome = match self.config.global_timeout() {
            None => self.race_unbounded(request, &mut progress).await,
            Some(limit) => {
                let result =
                    tokio::time::timeout(limit, self.race_unbounded(request, &mut progress)).await;
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => progress.timed_out(limit),
                }
            }
        };
        Decided {
            outcome,
            cleanup: progress.cleanup,
        }
    }

    async fn race_unbounded(&self, request: &CheckRequest, progress: &mut Progress) -> RaceOutcome {
        let full = self.runner.spawn(
            CheckerKind::FullScan,
            &self.config.full_scan,
            request,
            self.config.full_scan_timeout(),
        );

        match self.launch_daemon(request, progress).await {
            Ok(daemon) => {
                self.both_running(full, daemon, &request.working_dir, progress)
                    .await
            }
            Err(skipped) => {
                progress.daemon_failure = Some(skipped.clone());
                self.full_scan_only(full.await, &skipped)
            }
        }
    }

    /// The daemon task, or why the daemon was not started.
    async fn launch_daemon(
        &self,
        request: &CheckRequest,
        progress: &mut Progress,
    ) -> Result<RunnerTask, String> {
        let daemon = &self.config.daemon;
        if !daemon.enabled {
            return Err("daemon checker disabled".to_string());
        }
        if daemon.probe_before_race {
            let status = self.monitor.probe(&request.working_dir).await;
            if status != DaemonStatus::Running {
                tracing::debug!(%status, "daemon probe failed; running full scan only");
                if matches!(status, DaemonStatus::Stale | DaemonStatus::Crashed) {
                    self.reset_daemon(&request.working_dir, &mut progress.cleanup);
                }
                return Err(format!("daemon checker skipped: daemon {status}"));
            }
        }
        Ok(self.runner.spawn(
            CheckerKind::Daemon,
            &daemon.command,
            request,
            self.config.daemon_timeout(),
        ))
    }

    async fn both_running<F, D>(
        &self,
        mut full: F,
        mut daemon: D,
        working_dir: &Path,
        progress: &mut Progress,
    ) -> RaceOutcome
    where
        F: Future<Output = CheckerInvocation> + Unpin,
        D: Future<Output = CheckerInvocation> + Send + Unpin + 'static,
    {
        let first = tokio::select! {
            biased;
            invocation = &mut daemon => Finished::Daemon(invocation),
            invocation = &mut full => Finished::FullScan(invocation),
        };

        match first {
            Finished::Daemon(invocation) => {
                match evaluate_daemon(&invocation, &self.monitor, self.config.parse_warnings) {
                    Evaluation::Clean(parsed) => {
                        drop(full);
                        tracing::debug!(duration_ms = invocation.duration_ms, "daemon won the race");
                        self.trusted(Decision::DaemonWonClean, &invocation, parsed)
                    }
                    Evaluation::Rejected(rejection) => {
                        self.daemon_failed_waiting_full_scan(
                            full,
                            &invocation,
                            rejection,
                            working_dir,
                            progress,
                        )
                        .await
                    }
                }
            }
            Finished::FullScan(invocation) => {
                match evaluate_full_scan(&invocation, self.config.parse_warnings) {
                    Evaluation::Clean(parsed) => {
                        tracing::debug!(
                            duration_ms = invocation.duration_ms,
                            "full scan won the race; daemon may linger"
                        );
                        progress
                            .cleanup
                            .linger(Box::pin(daemon), self.config.daemon.grace());
                        self.trusted(Decision::FullScanWonClean, &invocation, parsed)
                    }
                    Evaluation::Rejected(rejection) => {
                        self.full_scan_failed_waiting_daemon(rejection, daemon, working_dir, progress)
                            .await
                    }
                }
            }
        }
    }

    async fn daemon_failed_waiting_full_scan<F>(
        &self,
        full: F,
        daemon_run: &CheckerInvocation,
        rejection: Rejection,
        working_dir: &Path,
        progress: &mut Progress,
    ) -> RaceOutcome
    where
        F: Future<Output = CheckerInvocation>,
    {
        tracing::warn!(
            exit_code = ?daemon_run.exit_code,
            reason = %rejection.reason(),
            stderr = %or_empty(&daemon_run.stderr),
            stdout = %or_empty(&daemon_run.stdout),
            "daemon result rejected; waiting for full scan"
        );
        progress.daemon_failure = Some(rejection.reason());
        if rejection.warrants_reset() {
            self.reset_daemon(working_dir, &mut progress.cleanup);
        }

        let invocation = full.await;
        match evaluate_full_scan(&invocation, self.config.parse_warnings) {
            Evaluation::Clean(parsed) => {
                let outcome =
                    self.trusted(Decision::FullScanAfterDaemonFailure, &invocation, parsed);
                with_notice(outcome, &rejection)
            }
            Evaluation::Rejected(full_rejection) => both_failed(&full_rejection, &rejection),
        }
    }

    async fn full_scan_failed_waiting_daemon<D>(
        &self,
        full_rejection: Rejection,
        daemon: D,
        working_dir: &Path,
        progress: &mut Progress,
    ) -> RaceOutcome
    where
        D: Future<Output = CheckerInvocation>,
    {
        tracing::warn!(
            reason = %full_rejection.reason(),
            "full scan failed; waiting for daemon"
        );
        progress.full_scan_failure = Some(full_rejection.reason());

        let invocation = daemon.await;
        match evaluate_daemon(&invocation, &self.monitor, self.config.parse_warnings) {
            Evaluation::Clean(parsed) => {
                let outcome =
                    self.trusted(Decision::DaemonAfterFullScanFailure, &invocation, parsed);
                with_notice(outcome, &full_rejection)
            }
            Evaluation::Rejected(rejection) => {
                if rejection.warrants_reset() {
                    self.reset_daemon(working_dir, &mut progress.cleanup);
                }
                both_failed(&full_rejection, &rejection)
            }
        }
    }

    fn full_scan_only(&self, invocation: CheckerInvocation, skipped: &str) -> RaceOutcome {
        match evaluate_full_scan(&invocation, self.config.parse_warnings) {
            Evaluation::Clean(parsed) => {
                self.trusted(Decision::FullScanWonClean, &invocation, parsed)
            }
            Evaluation::Rejected(rejection) => {
                tracing::error!(reason = %rejection.reason(), "full scan failed with no daemon to fall back on");
                RaceOutcome::both_failed(format!("{}; {skipped}", rejection.reason()))
            }
        }
    }

    /// Start `dmypy kill` in the background. Its result never reaches the outcome.
    fn reset_daemon(&self, working_dir: &Path, cleanup: &mut Cleanup) {
        if !self.config.daemon.kill_on_failure {
            return;
        }
        let monitor = self.monitor.clone();
        let working_dir = working_dir.to_path_buf();
        cleanup.reset(tokio::spawn(async move {
            if let Err(err) = monitor.kill(&working_dir).await {
                tracing::warn!(error = %err, "daemon reset failed");
            }
        }));
    }

    fn trusted(
        &self,
        decision: Decision,
        invocation: &CheckerInvocation,
        parsed: ParsedOutput,
    ) -> RaceOutcome {
        let issues_reported = invocation.exit_code == Some(self.config.diagnostics_exit_code);
        RaceOutcome::trusted(
            decision,
            invocation,
            parsed.diagnostics,
            parsed.summary.map(|summary| summary.line().to_string()),
            issues_reported,
        )
    }
}

/// Whichever checker the select saw finish first.
enum Finished {
    Daemon(CheckerInvocation),
    FullScan(CheckerInvocation),
}

fn with_notice(outcome: RaceOutcome, rejection: &Rejection) -> RaceOutcome {
    match rejection.notice() {
        Some(notice) => outcome.with_notice(notice),
        None => outcome,
    }
}

/// Full-scan reason first: it is the ground-truth checker.
fn both_failed(full: &Rejection, daemon: &Rejection) -> RaceOutcome {
    let reason = format!("{}; {}", full.reason(), daemon.reason());
    tracing::error!(%reason, "both checkers failed");
    RaceOutcome::both_failed(reason)
}

fn or_empty(text: &str) -> &str {
    match text.trim() {
        "" => "(empty)",
        trimmed => trimmed,
    }
}
