//! bmypy: race a full-scan type checker against its daemon.
//!
//! # Usage
//!
//! ```text
//! bmypy [OPTIONS] <PATHS>... [-- <CHECKER FLAGS>...]
//! bmypy src tests -- --strict
//! bmypy --full-scan-only --format json src
//! ```

mod check;

use clap::Parser;
use colored::Colorize;

use blunt_core::EXIT_ORCHESTRATION_FAILURE;
use blunt_report::ORCHESTRATION_ERROR_PREFIX;

use check::CheckArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "bmypy",
    version,
    about = "Run mypy and dmypy side by side and report the first trustworthy result",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    check: CheckArgs,

    /// Increase log verbosity (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit log events as JSON lines on stderr.
    #[arg(long)]
    log_json: bool,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_tracing(verbosity: u8, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let code = match cli.check.run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", ORCHESTRATION_ERROR_PREFIX.red().bold());
            EXIT_ORCHESTRATION_FAILURE
        }
    };
    std::process::exit(code);
}
