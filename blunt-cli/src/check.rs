//! The one thing bmypy does: build a request, race, report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use blunt_core::{config, BluntConfig, CheckRequest, RaceOutcome};
use blunt_race::{Cleanup, Decided, RaceCoordinator};
use blunt_report::{OutputFormat, Reporter};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Files or directories to type-check.
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Flags forwarded unchanged to both checkers (after `--`).
    #[arg(last = true, value_name = "CHECKER FLAGS")]
    pub checker_flags: Vec<String>,

    /// Config file to use instead of ~/.blunt/config.yaml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format: text or json.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Tera template replacing the built-in text rendering.
    #[arg(long, value_name = "FILE", conflicts_with = "raw")]
    pub template: Option<PathBuf>,

    /// Print the trusted checker's own stdout and stderr unchanged.
    #[arg(long)]
    pub raw: bool,

    /// Never start the daemon checker.
    #[arg(long)]
    pub full_scan_only: bool,

    /// Cancel both checkers after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub global_timeout: Option<u64>,
}

impl CheckArgs {
    /// Returns the process exit code.
    pub fn run(self) -> Result<i32> {
        let config = self.load_config()?;
        let working_dir =
            std::env::current_dir().context("could not determine working directory")?;
        let request = CheckRequest::new(self.paths.clone(), working_dir)
            .with_flags(self.checker_flags.clone());

        let mut reporter = Reporter::new(self.format)
            .context("failed to load built-in template")?
            .raw(self.raw);
        if let Some(template) = &self.template {
            reporter = reporter
                .with_template(template)
                .with_context(|| format!("failed to load template {}", template.display()))?;
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let coordinator = RaceCoordinator::new(config);
        let Decided { outcome, cleanup } = runtime.block_on(race(&coordinator, &request));

        let code = {
            let mut stdout = std::io::stdout().lock();
            let mut stderr = std::io::stderr().lock();
            reporter
                .report(&outcome, &mut stdout, &mut stderr)
                .context("failed to write report")?
        };

        runtime.block_on(clean_up(cleanup));
        Ok(code)
    }

    fn load_config(&self) -> Result<BluntConfig> {
        let mut config = match &self.config {
            Some(path) => config::load_at(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => config::load_or_default().context("failed to load ~/.blunt/config.yaml")?,
        };
        if self.full_scan_only {
            config.daemon.enabled = false;
        }
        if let Some(secs) = self.global_timeout {
            config.global_timeout_secs = Some(secs);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

async fn race(coordinator: &RaceCoordinator, request: &CheckRequest) -> Decided {
    tokio::select! {
        decided = coordinator.race(request) => decided,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::error!("interrupted; cancelling both checkers");
            Decided {
                outcome: RaceOutcome::both_failed("interrupted"),
                cleanup: Cleanup::default(),
            }
        }
    }
}

/// Runs after the report is out, so it only delays the exit.
async fn clean_up(cleanup: Cleanup) {
    if cleanup.is_empty() {
        return;
    }
    tokio::select! {
        () = cleanup.finish() => {}
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::debug!("interrupted; skipping daemon cleanup");
        }
    }
}
