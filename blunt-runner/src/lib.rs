//! Checker subprocess execution.
//!
//! [`ProcessRunner::run`] launches one checker, captures stdout and stderr
//! separately, enforces an optional wall-clock limit and always reaps the
//! child. [`ProcessRunner::spawn`] does the same on a tokio task and hands back
//! a [`RunnerTask`], which aborts the task (and with it kills the child) when
//! dropped.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use blunt_core::{
    BluntConfig, CheckRequest, CheckerFailure, CheckerInvocation, CheckerKind, CommandSpec,
    CompletionState,
};

/// Launches checker processes. Cheap to clone; holds no process state.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    bin_dir: Option<PathBuf>,
    diagnostics_exit_code: i32,
}

impl ProcessRunner {
    pub fn new(bin_dir: Option<PathBuf>, diagnostics_exit_code: i32) -> Self {
        Self {
            bin_dir,
            diagnostics_exit_code,
        }
    }

    pub fn from_config(config: &BluntConfig) -> Self {
        Self::new(config.bin_dir.clone(), config.diagnostics_exit_code)
    }

    /// Run `<command> <flags...> <files...>` in the request's working directory.
    pub async fn run(
        &self,
        checker: CheckerKind,
        command: &CommandSpec,
        request: &CheckRequest,
        timeout: Option<Duration>,
    ) -> CheckerInvocation {
        let mut args: Vec<OsString> = command.args.iter().map(OsString::from).collect();
        args.extend(request.forwarded_args());
        self.execute(checker, command, args, &request.working_dir, timeout)
            .await
    }

    /// Run `command` on its own, without forwarded arguments (daemon control).
    pub async fn run_command(
        &self,
        checker: CheckerKind,
        command: &CommandSpec,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> CheckerInvocation {
        let args = command.args.iter().map(OsString::from).collect();
        self.execute(checker, command, args, working_dir, timeout)
            .await
    }

    /// [`run`](Self::run) on a separate task.
    pub fn spawn(
        &self,
        checker: CheckerKind,
        command: &CommandSpec,
        request: &CheckRequest,
        timeout: Option<Duration>,
    ) -> RunnerTask {
        let runner = self.clone();
        let command = command.clone();
        let request = request.clone();
        let program = command.resolve_program(self.bin_dir.as_deref());
        let handle = tokio::spawn(async move {
            runner.run(checker, &command, &request, timeout).await
        });
        RunnerTask {
            checker,
            program: program.display().to_string(),
            handle,
        }
    }

    async fn execute(
        &self,
        checker: CheckerKind,
        command: &CommandSpec,
        args: Vec<OsString>,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> CheckerInvocation {
        let program = command.resolve_program(self.bin_dir.as_deref());
        let mut invocation = CheckerInvocation::pending(checker, program.display().to_string());
        let started = Instant::now();

        if !working_dir.is_dir() {
            invocation.state = failed(CheckerFailure::CheckerCrashed {
                checker,
                detail: format!("working directory {} does not exist", working_dir.display()),
            });
            return invocation;
        }

        tracing::debug!(%checker, program = %program.display(), ?args, "launching checker");

        let spawned = Command::new(&program)
            .args(&args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                invocation.state = failed(spawn_failure(checker, &program, err));
                invocation.duration_ms = elapsed_ms(started);
                return invocation;
            }
        };

        let collected = match timeout {
            Some(limit) => {
                let bounded = tokio::time::timeout(limit, collect(&mut child)).await;
                if let Ok(collected) = bounded {
                    collected
                } else {
                    reap(checker, &mut child).await;
                    tracing::debug!(
                        %checker,
                        limit_ms = limit.as_millis() as u64,
                        "checker timed out"
                    );
                    invocation.state = CompletionState::TimedOut {
                        after_ms: limit.as_millis() as u64,
                    };
                    invocation.duration_ms = elapsed_ms(started);
                    return invocation;
                }
            }
            None => collect(&mut child).await,
        };
        invocation.duration_ms = elapsed_ms(started);

        match collected {
            Ok((status, stdout, stderr)) => {
                invocation.stdout = String::from_utf8_lossy(&stdout).into_owned();
                invocation.stderr = String::from_utf8_lossy(&stderr).into_owned();
                invocation.exit_code = status.code();
                invocation.state = self.classify_exit(checker, status, &invocation.stderr);
            }
            Err(err) => {
                reap(checker, &mut child).await;
                invocation.state = failed(CheckerFailure::CheckerCrashed {
                    checker,
                    detail: format!("failed to collect output: {err}"),
                });
            }
        }

        tracing::debug!(
            %checker,
            exit_code = ?invocation.exit_code,
            duration_ms = invocation.duration_ms,
            state = ?invocation.state,
            "checker finished"
        );
        invocation
    }

    fn classify_exit(&self, checker: CheckerKind, status: ExitStatus, stderr: &str) -> CompletionState {
        match status.code() {
            Some(code) if code == 0 || code == self.diagnostics_exit_code => {
                CompletionState::Succeeded
            }
            Some(code) => failed(CheckerFailure::CheckerCrashed {
                checker,
                detail: with_stderr_tail(format!("exit code {code}"), stderr),
            }),
            None => failed(CheckerFailure::CheckerCrashed {
                checker,
                detail: with_stderr_tail(signal_detail(status), stderr),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// A checker running on its own task.
///
/// Resolves to the finished [`CheckerInvocation`]. Dropping it aborts the
/// task; the child is then killed through `kill_on_drop` and reaped by the
/// runtime in the background. Must not be polled again after it resolved.
#[derive(Debug)]
pub struct RunnerTask {
    checker: CheckerKind,
    program: String,
    handle: JoinHandle<CheckerInvocation>,
}

impl RunnerTask {
    pub fn checker(&self) -> CheckerKind {
        self.checker
    }
}

impl Future for RunnerTask {
    type Output = CheckerInvocation;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let checker = self.checker;
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(invocation)) => Poll::Ready(invocation),
            Poll::Ready(Err(err)) => {
                let mut invocation = CheckerInvocation::pending(checker, self.program.clone());
                invocation.state = failed(CheckerFailure::CheckerCrashed {
                    checker,
                    detail: format!("runner task failed: {err}"),
                });
                Poll::Ready(invocation)
            }
        }
    }
}

impl Drop for RunnerTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn collect(child: &mut Child) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr, status) =
        tokio::try_join!(read_pipe(stdout), read_pipe(stderr), child.wait())?;
    Ok((status, stdout, stderr))
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill and wait, so no zombie is left behind.
async fn reap(checker: CheckerKind, child: &mut Child) {
    if let Err(err) = child.kill().await {
        tracing::warn!(%checker, error = %err, "failed to kill checker process");
    }
}

fn spawn_failure(checker: CheckerKind, program: &Path, err: io::Error) -> CheckerFailure {
    if err.kind() == io::ErrorKind::NotFound {
        CheckerFailure::ExecutableMissing {
            checker,
            program: program.display().to_string(),
        }
    } else {
        CheckerFailure::CheckerCrashed {
            checker,
            detail: format!("failed to launch {}: {err}", program.display()),
        }
    }
}

fn failed(failure: CheckerFailure) -> CompletionState {
    CompletionState::Failed { failure }
}

fn with_stderr_tail(detail: String, stderr: &str) -> String {
    match stderr.lines().map(str::trim).rfind(|l| !l.is_empty()) {
        Some(tail) => format!("{detail}: {tail}"),
        None => detail,
    }
}

#[cfg(unix)]
fn signal_detail(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("terminated by signal {signal}"),
        None => format!("abnormal termination ({status})"),
    }
}

#[cfg(not(unix))]
fn signal_detail(status: ExitStatus) -> String {
    format!("abnormal termination ({status})")
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
