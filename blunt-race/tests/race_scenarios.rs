//! End-to-end races between two fake checkers.
//!
//! Each checker is `sh -c <script> fake <files...>`, so a scenario is just a
//! pair of shell scripts. Scripts sleep to force an ordering where it matters.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use blunt_core::{
    BluntConfig, CheckRequest, CheckerKind, CommandSpec, DaemonConfig, Decision, EXIT_CLEAN,
    EXIT_DIAGNOSTICS, EXIT_ORCHESTRATION_FAILURE,
};
use blunt_race::{Decided, RaceCoordinator};
use rstest::rstest;
use tempfile::TempDir;

const ONE_ERROR: &str = "echo 'a.py:3:5: error: Incompatible types  [assignment]'; \
     echo 'Found 1 error in 1 file (checked 1 source file)'; exit 1";
const TWO_ERRORS: &str = "echo 'a.py:3:5: error: Incompatible types  [assignment]'; \
     echo 'b.py:7: error: Name \"x\" is not defined  [name-defined]'; \
     echo 'Found 2 errors in 2 files (checked 2 source files)'; exit 1";
const NO_ISSUES: &str = "echo 'Success: no issues found in 1 source file'; exit 0";

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script, "fake"])
}

struct Scenario {
    dir: TempDir,
    config: BluntConfig,
}

impl Scenario {
    fn new(full_scan: &str, daemon: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let kill_marker = dir.path().join("daemon-killed");
        let config = BluntConfig {
            full_scan: sh(full_scan),
            daemon: DaemonConfig {
                command: sh(daemon),
                status_args: vec!["-c".into(), "echo 'Daemon is up'".into()],
                kill_args: vec!["-c".into(), format!("touch '{}'", kill_marker.display())],
                grace_ms: 200,
                ..DaemonConfig::default()
            },
            ..BluntConfig::default()
        };
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn daemon_was_killed(&self) -> bool {
        self.path("daemon-killed").exists()
    }

    fn request(&self) -> CheckRequest {
        CheckRequest::new(vec![PathBuf::from("a.py")], self.dir.path())
    }

    async fn decide(&self) -> Decided {
        RaceCoordinator::new(self.config.clone())
            .race(&self.request())
            .await
    }

    /// The outcome alone; leftover work is cancelled.
    async fn race(&self) -> blunt_core::RaceOutcome {
        self.decide().await.outcome
    }

    /// The outcome, after grace periods and daemon resets have run.
    async fn race_and_clean_up(&self) -> blunt_core::RaceOutcome {
        let decided = self.decide().await;
        decided.cleanup.finish().await;
        decided.outcome
    }
}

fn touch_then(marker: &Path, script: &str) -> String {
    format!("touch '{}'; {script}", marker.display())
}

// ---------------------------------------------------------------------------
// Clean winners
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fast_daemon_wins_and_cancels_full_scan() {
    let scenario = Scenario::new("sleep 5; exit 0", ONE_ERROR);
    let started = Instant::now();
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::DaemonWonClean);
    assert_eq!(outcome.trusted, Some(CheckerKind::Daemon));
    assert!(!outcome.fallback);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
    assert!(started.elapsed() < Duration::from_secs(4), "full scan was not cancelled");
}

#[tokio::test]
async fn fast_full_scan_wins_and_daemon_gets_grace() {
    let mut scenario = Scenario::new(NO_ISSUES, "");
    let marker = scenario.path("daemon-finished");
    scenario.config.daemon.command = sh(&format!(
        "sleep 0.5; touch '{}'; echo 'Success: no issues found in 1 source file'",
        marker.display()
    ));
    scenario.config.daemon.grace_ms = 2000;

    let Decided { outcome, cleanup } = scenario.decide().await;
    assert_eq!(outcome.decision, Decision::FullScanWonClean);
    assert_eq!(outcome.exit_code(), EXIT_CLEAN);
    assert_eq!(
        outcome.summary.as_deref(),
        Some("Success: no issues found in 1 source file")
    );
    assert!(!marker.exists(), "outcome should not wait for the daemon");

    cleanup.finish().await;
    assert!(marker.exists(), "daemon should finish within the grace period");
}

#[tokio::test]
async fn grace_period_never_overturns_a_clean_full_scan() {
    let mut scenario = Scenario::new(NO_ISSUES, "sleep 10");
    scenario.config.daemon.grace_ms = 3000;
    scenario.config.global_timeout_secs = Some(1);
    let started = Instant::now();
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::FullScanWonClean);
    assert_eq!(outcome.exit_code(), EXIT_CLEAN);
    assert!(started.elapsed() < Duration::from_millis(900), "{:?}", started.elapsed());
}

#[tokio::test]
async fn identical_line_from_both_checkers_is_reported_once() {
    let scenario = Scenario::new(ONE_ERROR, &format!("sleep 0.05; {ONE_ERROR}"));
    let outcome = scenario.race().await;

    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics.error_count(), 1);
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
}

// ---------------------------------------------------------------------------
// Daemon fallback
// ---------------------------------------------------------------------------

#[rstest]
#[case::crashed("echo 'Daemon crashed!' >&2; exit 2")]
#[case::stale("echo 'Restarting: configuration changed'; echo 'Success: no issues found in 1 source file'")]
#[case::no_summary("echo 'a.py:9: error: something'; exit 1")]
#[case::unknown_stderr("echo 'Success: no issues found in 1 source file'; echo 'odd' >&2")]
#[tokio::test]
async fn untrusted_daemon_falls_back_silently(#[case] daemon: &str) {
    let scenario = Scenario::new(&format!("sleep 0.3; {NO_ISSUES}"), daemon);
    let outcome = scenario.race_and_clean_up().await;

    assert_eq!(outcome.decision, Decision::FullScanAfterDaemonFailure);
    assert_eq!(outcome.trusted, Some(CheckerKind::FullScan));
    assert!(outcome.fallback);
    assert!(outcome.notices.is_empty(), "notices: {:?}", outcome.notices);
    assert_eq!(outcome.exit_code(), EXIT_CLEAN);
    assert!(scenario.daemon_was_killed());
}

#[tokio::test]
async fn recoverable_daemon_result_is_replaced_by_full_scan_set() {
    let stale_daemon = "echo 'a.py:1: error: stale result'; \
         echo 'Found 1 error in 1 file (checked 1 source file)'; \
         echo 'The daemon is stale' >&2; exit 1";
    let scenario = Scenario::new(&format!("sleep 0.3; {TWO_ERRORS}"), stale_daemon);
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::FullScanAfterDaemonFailure);
    let messages: Vec<_> = outcome.diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["Incompatible types", "Name \"x\" is not defined"]
    );
}

#[tokio::test]
async fn missing_daemon_leaves_full_scan_result_unchanged() {
    let mut scenario = Scenario::new(&format!("sleep 0.3; {TWO_ERRORS}"), "");
    scenario.config.daemon.command = CommandSpec::new("no-such-daemon-checker", &["run", "--"]);
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::FullScanAfterDaemonFailure);
    assert_eq!(outcome.diagnostics.len(), 2);
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
    assert_eq!(outcome.notices.len(), 1);
    assert!(outcome.notices[0].contains("daemon checker executable not found"));
}

#[tokio::test]
async fn kill_on_failure_can_be_disabled() {
    let mut scenario = Scenario::new(
        &format!("sleep 0.3; {NO_ISSUES}"),
        "echo 'Daemon crashed!'; exit 2",
    );
    scenario.config.daemon.kill_on_failure = false;
    let outcome = scenario.race_and_clean_up().await;

    assert_eq!(outcome.decision, Decision::FullScanAfterDaemonFailure);
    assert!(!scenario.daemon_was_killed());
}

#[tokio::test]
async fn hung_daemon_reset_does_not_hold_back_fallback() {
    let mut scenario = Scenario::new(
        &format!("sleep 0.2; {NO_ISSUES}"),
        "echo 'Daemon crashed!'; exit 2",
    );
    scenario.config.daemon.kill_args = vec!["-c".into(), "sleep 30".into()];
    scenario.config.global_timeout_secs = Some(2);
    let started = Instant::now();
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::FullScanAfterDaemonFailure);
    assert_eq!(outcome.exit_code(), EXIT_CLEAN);
    assert!(started.elapsed() < Duration::from_millis(1500), "{:?}", started.elapsed());
}

// ---------------------------------------------------------------------------
// Full-scan failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn crashed_full_scan_falls_back_to_daemon_with_notice() {
    let scenario = Scenario::new(
        "echo 'INTERNAL ERROR' >&2; exit 2",
        &format!("sleep 0.3; {ONE_ERROR}"),
    );
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::DaemonAfterFullScanFailure);
    assert_eq!(outcome.trusted, Some(CheckerKind::Daemon));
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
    assert_eq!(outcome.notices.len(), 1);
    assert!(outcome.notices[0].contains("full-scan checker crashed"));
}

#[tokio::test]
async fn timed_out_full_scan_falls_back_to_daemon() {
    let mut scenario = Scenario::new("sleep 10", &format!("sleep 1.5; {ONE_ERROR}"));
    scenario.config.full_scan_timeout_secs = Some(1);
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::DaemonAfterFullScanFailure);
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
    assert!(outcome.notices[0].contains("timed out"));
}

#[tokio::test]
async fn daemon_diagnostics_survive_full_scan_crash() {
    let scenario = Scenario::new("kill -9 $$", &format!("sleep 0.3; {TWO_ERRORS}"));
    let outcome = scenario.race().await;

    assert_eq!(outcome.diagnostics.len(), 2);
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
}

// ---------------------------------------------------------------------------
// Both fail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn both_timing_out_is_an_orchestration_failure() {
    let mut scenario = Scenario::new("sleep 10", "sleep 10");
    scenario.config.full_scan_timeout_secs = Some(1);
    scenario.config.daemon_timeout_secs = Some(1);
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::BothFailed);
    assert_eq!(outcome.exit_code(), EXIT_ORCHESTRATION_FAILURE);
    assert!(outcome.diagnostics.is_empty());
    let failure = outcome.failure.expect("failure reason");
    assert!(failure.contains("full-scan checker timed out"), "{failure}");
    assert!(failure.contains("daemon checker timed out"), "{failure}");
}

#[tokio::test]
async fn both_crashing_names_both_reasons() {
    let scenario = Scenario::new(
        "echo 'full boom' >&2; exit 3",
        "sleep 0.2; echo 'daemon boom' >&2; exit 3",
    );
    let outcome = scenario.race().await;

    assert_eq!(outcome.exit_code(), EXIT_ORCHESTRATION_FAILURE);
    let failure = outcome.failure.expect("failure reason");
    assert!(failure.contains("full boom"), "{failure}");
    assert!(failure.contains("daemon"), "{failure}");
}

#[tokio::test]
async fn global_timeout_cancels_both_checkers() {
    let mut scenario = Scenario::new("sleep 10", "sleep 10");
    scenario.config.global_timeout_secs = Some(1);
    let started = Instant::now();
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::BothFailed);
    assert!(outcome.failure.unwrap_or_default().contains("global timeout"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn global_timeout_keeps_the_known_daemon_failure() {
    let mut scenario = Scenario::new("sleep 10", "echo 'daemon boom' >&2; exit 3");
    scenario.config.global_timeout_secs = Some(1);
    let outcome = scenario.race().await;

    assert_eq!(outcome.exit_code(), EXIT_ORCHESTRATION_FAILURE);
    let failure = outcome.failure.expect("failure reason");
    assert!(failure.contains("global timeout after 1s"), "{failure}");
    assert!(failure.contains("full-scan checker cancelled"), "{failure}");
    assert!(failure.contains("daemon checker crashed"), "{failure}");
    assert!(failure.contains("daemon boom"), "{failure}");
}

// ---------------------------------------------------------------------------
// Without a daemon
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_daemon_is_never_started() {
    let mut scenario = Scenario::new(ONE_ERROR, "");
    let marker = scenario.path("daemon-started");
    scenario.config.daemon.command = sh(&touch_then(&marker, ONE_ERROR));
    scenario.config.daemon.enabled = false;
    let outcome = scenario.race().await;

    assert_eq!(outcome.decision, Decision::FullScanWonClean);
    assert_eq!(outcome.exit_code(), EXIT_DIAGNOSTICS);
    assert!(!marker.exists());
}

#[tokio::test]
async fn failed_probe_skips_the_daemon() {
    let mut scenario = Scenario::new(NO_ISSUES, "");
    let marker = scenario.path("daemon-started");
    scenario.config.daemon.command = sh(&touch_then(&marker, NO_ISSUES));
    scenario.config.daemon.probe_before_race = true;
    scenario.config.daemon.status_args =
        vec!["-c".into(), "echo 'Daemon is not running' >&2; exit 2".into()];
    let outcome = scenario.race_and_clean_up().await;

    assert_eq!(outcome.decision, Decision::FullScanWonClean);
    assert_eq!(outcome.exit_code(), EXIT_CLEAN);
    assert!(!marker.exists());
    assert!(!scenario.daemon_was_killed(), "not-running daemon needs no reset");
}

#[tokio::test]
async fn full_scan_failure_without_daemon_is_fatal() {
    let mut scenario = Scenario::new("exit 2", "");
    scenario.config.daemon.enabled = false;
    let outcome = scenario.race().await;

    assert_eq!(outcome.exit_code(), EXIT_ORCHESTRATION_FAILURE);
    let failure = outcome.failure.expect("failure reason");
    assert!(failure.contains("daemon checker disabled"), "{failure}");
}

#[tokio::test]
async fn one_coordinator_serves_concurrent_races() {
    let first = Scenario::new(ONE_ERROR, &format!("sleep 0.05; {ONE_ERROR}"));
    let second = Scenario::new(NO_ISSUES, &format!("sleep 0.05; {NO_ISSUES}"));
    let coordinator = RaceCoordinator::new(first.config.clone());
    let mut other = first.config.clone();
    other.full_scan = second.config.full_scan.clone();
    other.daemon.command = second.config.daemon.command.clone();
    let coordinator_two = RaceCoordinator::new(other);

    let first_request = first.request();
    let second_request = second.request();
    let (a, b) = tokio::join!(
        coordinator.race(&first_request),
        coordinator_two.race(&second_request)
    );
    assert_eq!(a.outcome.exit_code(), EXIT_DIAGNOSTICS);
    assert_eq!(b.outcome.exit_code(), EXIT_CLEAN);
}
